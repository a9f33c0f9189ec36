//! Page geometry: reading it from a target and planning scroll offsets over it.

use crate::{PageTarget, RawLayoutMetrics, SnapshotError};
use serde::Serialize;
use tracing::debug;

/// Scroll geometry of a page, computed fresh for each capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub scroll_height: u32,
    pub client_height: u32,
    pub scroll_width: u32,
    pub client_width: u32,
    pub max_scroll_y: u32,
    pub max_scroll_x: u32,
}

impl PageGeometry {
    /// Reconciles raw metrics: the larger of the document and body scroll
    /// sizes wins, and unset client sizes fall back to the window size.
    pub fn from_raw(raw: &RawLayoutMetrics) -> Self {
        let scroll_height = raw.doc_scroll_height.max(raw.body_scroll_height);
        let scroll_width = raw.doc_scroll_width.max(raw.body_scroll_width);
        let client_height = if raw.doc_client_height > 0 {
            raw.doc_client_height
        } else {
            raw.inner_height
        };
        let client_width = if raw.doc_client_width > 0 {
            raw.doc_client_width
        } else {
            raw.inner_width
        };

        Self {
            scroll_height,
            client_height,
            scroll_width,
            client_width,
            max_scroll_y: scroll_height.saturating_sub(client_height),
            max_scroll_x: scroll_width.saturating_sub(client_width),
        }
    }

    /// `max(1, ceil(scroll_height / client_height))`. A page with no client
    /// height yet gets a single step.
    pub fn step_count(&self) -> usize {
        if self.client_height == 0 {
            return 1;
        }
        (self.scroll_height.div_ceil(self.client_height) as usize).max(1)
    }

    /// Offsets visited by a full-page capture, ascending, the last one
    /// clamped to `max_scroll_y`.
    pub fn plan_offsets(&self) -> Vec<u32> {
        (0..self.step_count())
            .map(|i| {
                let y = (i as u64) * u64::from(self.client_height);
                y.min(u64::from(self.max_scroll_y)) as u32
            })
            .collect()
    }
}

/// Reads live layout metrics from the target. Side-effect free.
pub async fn inspect(target: &dyn PageTarget) -> Result<PageGeometry, SnapshotError> {
    let raw = target.layout_metrics().await?;
    let geometry = PageGeometry::from_raw(&raw);
    debug!(
        target_id = %target.id(),
        scroll_height = geometry.scroll_height,
        client_height = geometry.client_height,
        max_scroll_y = geometry.max_scroll_y,
        "Inspected page geometry"
    );
    Ok(geometry)
}

/// The scroll offset to restore once capturing is over.
pub async fn current_scroll_y(target: &dyn PageTarget) -> Result<u32, SnapshotError> {
    target.scroll_y().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(scroll_height: u32, client_height: u32) -> PageGeometry {
        PageGeometry::from_raw(&RawLayoutMetrics {
            doc_scroll_height: scroll_height,
            doc_client_height: client_height,
            ..Default::default()
        })
    }

    #[test]
    fn test_plan_clamps_last_step() {
        let g = geometry(2500, 1000);
        assert_eq!(g.max_scroll_y, 1500);
        assert_eq!(g.step_count(), 3);
        assert_eq!(g.plan_offsets(), vec![0, 1000, 1500]);
    }

    #[test]
    fn test_plan_without_overflow() {
        let g = geometry(800, 800);
        assert_eq!(g.step_count(), 1);
        assert_eq!(g.plan_offsets(), vec![0]);

        let short = geometry(300, 800);
        assert_eq!(short.max_scroll_y, 0);
        assert_eq!(short.plan_offsets(), vec![0]);
    }

    #[test]
    fn test_plan_covers_page_and_never_overshoots() {
        for scroll_height in [1, 999, 1000, 1001, 2000, 4321, 10_000] {
            for client_height in [1, 333, 720, 1000] {
                let g = geometry(scroll_height, client_height);
                let offsets = g.plan_offsets();
                let expected_steps =
                    ((scroll_height as f64) / (client_height as f64)).ceil() as usize;

                assert_eq!(offsets.len(), expected_steps.max(1));
                assert_eq!(*offsets.last().unwrap(), g.max_scroll_y);
                assert!(offsets.iter().all(|&y| y <= g.max_scroll_y));
                assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn test_divergent_document_and_body() {
        let g = PageGeometry::from_raw(&RawLayoutMetrics {
            doc_scroll_height: 1200,
            body_scroll_height: 3000,
            doc_client_height: 0,
            inner_height: 900,
            doc_scroll_width: 1024,
            body_scroll_width: 1400,
            doc_client_width: 0,
            inner_width: 1024,
        });
        assert_eq!(g.scroll_height, 3000);
        assert_eq!(g.client_height, 900);
        assert_eq!(g.max_scroll_y, 2100);
        assert_eq!(g.scroll_width, 1400);
        assert_eq!(g.max_scroll_x, 376);
    }

    #[test]
    fn test_unrendered_page_gets_one_step() {
        let g = PageGeometry::from_raw(&RawLayoutMetrics::default());
        assert_eq!(g.step_count(), 1);
        assert_eq!(g.plan_offsets(), vec![0]);
    }
}

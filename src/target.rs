//! The seam between the capture pipeline and whatever hosts the page.
//!
//! Every operation is asynchronous and may suspend; none can be cancelled
//! once issued, matching the underlying DevTools calls.

use crate::SnapshotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of an open page, the `tabId` of the request protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Layout metrics as reported by the page, before any reconciliation.
///
/// `document.documentElement` and `document.body` may disagree; a missing
/// body reports zeros. Client sizes are zero until the document has rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLayoutMetrics {
    pub doc_scroll_height: u32,
    pub body_scroll_height: u32,
    pub doc_client_height: u32,
    pub inner_height: u32,
    pub doc_scroll_width: u32,
    pub body_scroll_width: u32,
    pub doc_client_width: u32,
    pub inner_width: u32,
}

/// An `a[href]` found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub text: String,
}

/// Primitive operations the pipeline needs from a page.
#[async_trait]
pub trait PageTarget: Send + Sync {
    fn id(&self) -> TargetId;

    async fn url(&self) -> Result<String, SnapshotError>;

    async fn title(&self) -> Result<String, SnapshotError>;

    async fn layout_metrics(&self) -> Result<RawLayoutMetrics, SnapshotError>;

    /// Current vertical scroll offset, rounded to whole pixels.
    async fn scroll_y(&self) -> Result<u32, SnapshotError>;

    /// Immediate, non-animated scroll to `(0, y)`.
    async fn scroll_to(&self, y: u32) -> Result<(), SnapshotError>;

    /// PNG of the currently visible viewport. A platform quota rejection is
    /// reported as [`SnapshotError::QuotaExceeded`].
    async fn capture_visible(&self) -> Result<Vec<u8>, SnapshotError>;

    async fn outer_html(&self) -> Result<String, SnapshotError>;

    async fn links(&self) -> Result<Vec<PageLink>, SnapshotError>;

    /// `src` of every `script[src]`, unfiltered and in document order.
    async fn script_sources(&self) -> Result<Vec<String>, SnapshotError>;
}

/// Looks up open targets by id, and the one that has focus.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, id: TargetId) -> Option<Arc<dyn PageTarget>>;

    async fn active(&self) -> Option<Arc<dyn PageTarget>>;
}

const PRIVILEGED_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "chrome-search://",
    "chrome-untrusted://",
    "devtools://",
    "edge://",
    "about:",
    "view-source:",
];

/// Internal browser pages that automatic triggers must never touch.
pub fn is_privileged_url(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    PRIVILEGED_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_urls() {
        assert!(is_privileged_url("chrome://settings"));
        assert!(is_privileged_url("about:blank"));
        assert!(is_privileged_url("DevTools://devtools/bundled/inspector.html"));
        assert!(!is_privileged_url("https://example.com/chrome://"));
        assert!(!is_privileged_url("http://localhost:8080"));
    }

    #[test]
    fn test_raw_metrics_wire_names() {
        let raw: RawLayoutMetrics = serde_json::from_str(
            r#"{"docScrollHeight":2500,"bodyScrollHeight":2400,"docClientHeight":1000,
                "innerHeight":1000,"docScrollWidth":1280,"bodyScrollWidth":1280,
                "docClientWidth":1265,"innerWidth":1280}"#,
        )
        .unwrap();
        assert_eq!(raw.doc_scroll_height, 2500);
        assert_eq!(raw.doc_client_width, 1265);
    }
}

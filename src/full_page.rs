//! Full-page capture orchestration
//!
//! Drives a target through a planned sequence of scroll offsets, capturing
//! one viewport image per offset, then writes every image as its own
//! artifact. Images are never stitched.
//!
//! A session is owned by one invocation. Sessions share the process-wide
//! [`CaptureThrottle`], and sessions on the same target run one at a time
//! because each of them moves the target's scroll position.

use crate::encoding::{persist_with_fallback, PayloadEncoding};
use crate::inspector::{self, PageGeometry};
use crate::{
    metrics, scroll, ArtifactId, ArtifactKind, ArtifactName, ArtifactSink, CaptureClient,
    CaptureSettings, CaptureThrottle, ImageFormat, PageTarget, SaveOutcome, SnapshotError,
    TargetId,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One viewport image and the offset it was taken at.
#[derive(Debug, Clone)]
pub struct CaptureSegment {
    pub offset_y: u32,
    pub image: Vec<u8>,
}

/// Transient state of one full-page capture.
#[derive(Debug)]
pub struct CaptureSession {
    pub target_id: TargetId,
    pub geometry: PageGeometry,
    pub step_count: usize,
    pub segments: Vec<CaptureSegment>,
    pub original_scroll_y: u32,
}

impl CaptureSession {
    pub fn offsets(&self) -> Vec<u32> {
        self.segments.iter().map(|s| s.offset_y).collect()
    }
}

pub struct FullPageCapturer {
    client: CaptureClient,
    throttle: Arc<CaptureThrottle>,
    sink: Arc<dyn ArtifactSink>,
    settings: CaptureSettings,
    image_format: ImageFormat,
    max_url_len: usize,
    session_locks: DashMap<TargetId, Arc<Mutex<()>>>,
}

impl FullPageCapturer {
    pub fn new(
        client: CaptureClient,
        throttle: Arc<CaptureThrottle>,
        sink: Arc<dyn ArtifactSink>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            client,
            throttle,
            sink,
            settings,
            image_format: ImageFormat::Png,
            max_url_len: usize::MAX,
            session_locks: DashMap::new(),
        }
    }

    pub fn with_image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    pub fn with_max_url_len(mut self, max_url_len: usize) -> Self {
        self.max_url_len = max_url_len;
        self
    }

    /// Captures the whole page and persists each segment.
    ///
    /// Never fails outright: a broken capture loop yields
    /// `{success: false, error}`, and individual write failures only shrink
    /// the list of ids.
    pub async fn capture_full_page(
        &self,
        target: &dyn PageTarget,
        name: &ArtifactName,
    ) -> SaveOutcome {
        let started = Instant::now();

        let session = match self.run_session(target).await {
            Ok(session) => session,
            Err(e) => {
                error!(target_id = %target.id(), "Error saving screenshot: {}", e);
                metrics::record_capture_session(started.elapsed(), false);
                return SaveOutcome::failed(ArtifactKind::Screenshot, &e);
            }
        };
        metrics::record_capture_session(started.elapsed(), true);

        let ids = self.persist_segments(&session, name).await;
        info!(
            target_id = %target.id(),
            files = ids.len(),
            segments = session.segments.len(),
            "Saved full-page screenshots"
        );
        SaveOutcome::many(ArtifactKind::Screenshot, ids)
    }

    /// Steps 1–4: inspect, capture every offset, restore the scroll position.
    /// Waits for any other session on the same target to finish first.
    pub async fn run_session(
        &self,
        target: &dyn PageTarget,
    ) -> Result<CaptureSession, SnapshotError> {
        let id = target.id();
        let lock = Arc::clone(&self.session_locks.entry(id).or_default());

        let result = {
            let _exclusive = lock.lock().await;
            self.run_exclusive(target).await
        };

        drop(lock);
        self.session_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn run_exclusive(
        &self,
        target: &dyn PageTarget,
    ) -> Result<CaptureSession, SnapshotError> {
        let geometry = inspector::inspect(target).await?;
        let original_scroll_y = inspector::current_scroll_y(target).await?;

        let mut session = CaptureSession {
            target_id: target.id(),
            geometry,
            step_count: geometry.step_count(),
            segments: Vec::with_capacity(geometry.step_count()),
            original_scroll_y,
        };

        let captured = self.capture_segments(target, &mut session).await;

        if let Err(e) = scroll::scroll_to(target, original_scroll_y).await {
            warn!(
                target_id = %target.id(),
                y = original_scroll_y,
                "Failed to restore scroll position: {}", e
            );
        }

        captured.map(|_| session)
    }

    async fn capture_segments(
        &self,
        target: &dyn PageTarget,
        session: &mut CaptureSession,
    ) -> Result<(), SnapshotError> {
        for offset_y in session.geometry.plan_offsets() {
            scroll::scroll_to(target, offset_y).await?;
            scroll::settle(self.settings.settle_delay).await;

            let permit = self.throttle.acquire().await;
            let image = self.client.capture_visible(target).await?;
            permit.record_capture();

            debug!(
                target_id = %session.target_id,
                offset_y,
                step = session.segments.len() + 1,
                steps = session.step_count,
                "Captured segment"
            );
            session.segments.push(CaptureSegment { offset_y, image });
        }
        Ok(())
    }

    /// Step 5: one write per segment; failures are logged and skipped.
    async fn persist_segments(
        &self,
        session: &CaptureSession,
        name: &ArtifactName,
    ) -> Vec<ArtifactId> {
        let total = session.segments.len();
        let mut ids = Vec::with_capacity(total);

        for (index, segment) in session.segments.iter().enumerate() {
            let filename = name.segment_filename(self.image_format.extension(), index, total);

            let written = match self.encode_image(&segment.image) {
                Ok(bytes) => {
                    persist_with_fallback(
                        self.sink.as_ref(),
                        &bytes,
                        self.image_format.mime_type(),
                        &filename,
                        PayloadEncoding::BINARY_CHAIN,
                        self.max_url_len,
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match written {
                Ok(id) => {
                    ids.push(id);
                    sleep(self.settings.persist_pause).await;
                }
                Err(e) => {
                    metrics::record_sink_failure(ArtifactKind::Screenshot);
                    error!(
                        target_id = %session.target_id,
                        part = index + 1,
                        filename = %filename,
                        "Failed to persist screenshot part: {}", e
                    );
                }
            }
        }

        ids
    }

    fn encode_image(&self, png: &[u8]) -> Result<Vec<u8>, SnapshotError> {
        match self.image_format {
            ImageFormat::Png => Ok(png.to_vec()),
            ImageFormat::Jpeg => {
                let img = image::load_from_memory(png)
                    .map_err(|e| SnapshotError::SinkError(e.to_string()))?;

                let mut jpeg_data = Vec::new();
                img.to_rgb8()
                    .write_to(&mut std::io::Cursor::new(&mut jpeg_data), image::ImageFormat::Jpeg)
                    .map_err(|e| SnapshotError::SinkError(e.to_string()))?;

                Ok(jpeg_data)
            }
        }
    }
}

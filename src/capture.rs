//! Viewport capture with reactive backoff on the platform quota.

use crate::{metrics, PageTarget, RetryConfig, SnapshotError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Message fragment the browser uses when too many captures land per second.
pub const QUOTA_MARKER: &str = "MAX_CAPTURE_VISIBLE_TAB_CALLS_PER_SECOND";

/// Whether a raw platform error message reports the capture quota.
pub fn is_quota_message(message: &str) -> bool {
    message.contains(QUOTA_MARKER)
}

/// Captures the visible viewport, retrying quota rejections with
/// exponential backoff.
///
/// Spacing between captures is not this client's concern; see
/// [`crate::CaptureThrottle`].
#[derive(Debug, Clone)]
pub struct CaptureClient {
    policy: RetryConfig,
}

impl CaptureClient {
    pub fn new(policy: RetryConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    /// Quota errors are retried up to `max_retries` times, waiting
    /// `initial_backoff`, then growing by `multiplier` each time. Exhausted
    /// retries and every other failure come back as `CaptureFailed`, except a
    /// vanished target which stays `TargetUnavailable`.
    pub async fn capture_visible(&self, target: &dyn PageTarget) -> Result<Vec<u8>, SnapshotError> {
        let mut attempt = 0;
        let mut backoff = self.policy.initial_backoff;

        loop {
            match target.capture_visible().await {
                Ok(image) => {
                    debug!(
                        target_id = %target.id(),
                        bytes = image.len(),
                        attempt,
                        "Captured viewport"
                    );
                    return Ok(image);
                }
                Err(SnapshotError::QuotaExceeded(message)) if attempt < self.policy.max_retries => {
                    warn!(
                        target_id = %target.id(),
                        backoff_ms = backoff.as_millis() as u64,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        "Capture quota hit, backing off: {}", message
                    );
                    metrics::record_quota_retry();
                    sleep(backoff).await;
                    attempt += 1;
                    backoff = self.next_backoff(backoff);
                }
                Err(SnapshotError::QuotaExceeded(message)) => {
                    return Err(SnapshotError::CaptureFailed(format!(
                        "quota still exceeded after {attempt} retries: {message}"
                    )));
                }
                Err(err @ SnapshotError::TargetUnavailable(_))
                | Err(err @ SnapshotError::CaptureFailed(_)) => return Err(err),
                Err(other) => return Err(SnapshotError::CaptureFailed(other.to_string())),
            }
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.policy.multiplier)
    }
}

impl Default for CaptureClient {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

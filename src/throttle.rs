//! Process-wide pacing of viewport captures.
//!
//! The platform capture quota is shared by every page in the browser, so the
//! spacing between captures is a property of the process, not of a capture
//! session. [`CaptureThrottle::shared`] hands out the one instance every
//! session should use; tests build private instances with
//! [`CaptureThrottle::new`].
//!
//! A [`ThrottlePermit`] holds the throttle until it is dropped, so concurrent
//! sessions take turns: no two captures are in flight at once and each starts
//! at least `min_interval` after the previous successful one ended.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Instant};
use tracing::debug;

static PROCESS_THROTTLE: OnceLock<Arc<CaptureThrottle>> = OnceLock::new();

#[derive(Debug)]
pub struct CaptureThrottle {
    min_interval: Duration,
    last_capture: Mutex<Option<Instant>>,
}

impl CaptureThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_capture: Mutex::new(None),
        }
    }

    /// The process-wide throttle. The interval passed by the first caller
    /// wins; later callers share that instance regardless of their argument.
    pub fn shared(min_interval: Duration) -> Arc<Self> {
        PROCESS_THROTTLE
            .get_or_init(|| Arc::new(Self::new(min_interval)))
            .clone()
    }

    /// Waits for exclusive use of the capture quota and for the minimum
    /// spacing since the last successful capture to elapse.
    pub async fn acquire(&self) -> ThrottlePermit<'_> {
        let guard = self.last_capture.lock().await;
        let mut waited = Duration::ZERO;

        if let Some(last) = *guard {
            let since_last = last.elapsed();
            if since_last < self.min_interval {
                waited = self.min_interval - since_last;
                debug!(wait_ms = waited.as_millis() as u64, "Spacing capture");
                sleep(waited).await;
            }
        }

        ThrottlePermit { guard, waited }
    }

    pub async fn last_capture(&self) -> Option<Instant> {
        *self.last_capture.lock().await
    }
}

/// Exclusive right to issue one capture.
pub struct ThrottlePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
    waited: Duration,
}

impl ThrottlePermit<'_> {
    /// Time spent waiting for spacing (not for the lock).
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Marks the end of a successful capture. Dropping the permit without
    /// recording leaves the previous timestamp in place.
    pub fn record_capture(mut self) {
        *self.guard = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_capture_is_not_delayed() {
        let throttle = CaptureThrottle::new(Duration::from_millis(700));
        let permit = throttle.acquire().await;
        assert_eq!(permit.waited(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_measured_from_last_success() {
        let throttle = CaptureThrottle::new(Duration::from_millis(700));
        throttle.acquire().await.record_capture();

        sleep(Duration::from_millis(250)).await;
        let start = Instant::now();
        let permit = throttle.acquire().await;
        assert_eq!(permit.waited(), Duration::from_millis(450));
        assert_eq!(start.elapsed(), Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecorded_permit_keeps_previous_timestamp() {
        let throttle = CaptureThrottle::new(Duration::from_millis(700));
        throttle.acquire().await.record_capture();
        let recorded = throttle.last_capture().await;

        sleep(Duration::from_millis(800)).await;
        drop(throttle.acquire().await);
        assert_eq!(throttle.last_capture().await, recorded);
    }

    #[test]
    fn test_shared_returns_one_instance() {
        let a = CaptureThrottle::shared(Duration::from_millis(700));
        let b = CaptureThrottle::shared(Duration::from_millis(5));
        assert!(Arc::ptr_eq(&a, &b));
    }
}

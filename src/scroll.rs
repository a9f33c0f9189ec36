//! Scroll control. Scrolling mutates what the user sees, so whoever scrolls
//! is responsible for putting the page back.

use crate::{PageTarget, SnapshotError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Scrolls the target to `(0, y)` without animation. Does not wait for the
/// page to repaint; pair with [`settle`] before capturing.
pub async fn scroll_to(target: &dyn PageTarget, y: u32) -> Result<(), SnapshotError> {
    debug!(target_id = %target.id(), y, "Scrolling to");
    target.scroll_to(y).await
}

/// Gives repaints and lazy-loaded content time to land after a scroll.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

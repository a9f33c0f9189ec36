//! Chrome DevTools-backed targets
//!
//! This module launches one Chrome instance, keeps the open pages it created
//! under small integer ids, and implements [`PageTarget`] for them by running
//! short scripts in the page and calling `Page.captureScreenshot`.

use crate::capture::is_quota_message;
use crate::{
    create_browser_config, Config, PageLink, PageTarget, RawLayoutMetrics, SnapshotError,
    TargetId, TargetResolver,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, EventLoadEventFired};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const LAYOUT_METRICS_JS: &str = r#"(() => {
    const doc = document.documentElement;
    const body = document.body;
    return {
        docScrollHeight: doc ? doc.scrollHeight : 0,
        bodyScrollHeight: body ? body.scrollHeight : 0,
        docClientHeight: doc ? doc.clientHeight : 0,
        innerHeight: window.innerHeight || 0,
        docScrollWidth: doc ? doc.scrollWidth : 0,
        bodyScrollWidth: body ? body.scrollWidth : 0,
        docClientWidth: doc ? doc.clientWidth : 0,
        innerWidth: window.innerWidth || 0
    };
})()"#;

const SCROLL_Y_JS: &str = "(() => window.scrollY || 0)()";

const OUTER_HTML_JS: &str =
    "(() => document.documentElement ? document.documentElement.outerHTML : '')()";

const LINKS_JS: &str = r#"(() => Array.from(document.querySelectorAll('a[href]')).map(a => ({
    href: typeof a.href === 'string' ? a.href : ((a.href && a.href.baseVal) || ''),
    text: (a.textContent || '').trim()
})))()"#;

const SCRIPT_SOURCES_JS: &str =
    "(() => Array.from(document.querySelectorAll('script[src]')).map(s => s.src))()";

/// Messages Chrome produces once a page or its session is gone.
const DETACHED_MARKERS: &[&str] = &[
    "No target with given id",
    "No session with given id",
    "Target closed",
    "Session closed",
    "receiver is gone",
];

fn map_cdp_error(err: CdpError) -> SnapshotError {
    let message = err.to_string();
    if is_quota_message(&message) {
        SnapshotError::QuotaExceeded(message)
    } else if DETACHED_MARKERS.iter().any(|marker| message.contains(marker)) {
        SnapshotError::TargetUnavailable(message)
    } else {
        SnapshotError::ScriptError(message)
    }
}

/// One open page.
pub struct ChromeTarget {
    id: TargetId,
    page: Page,
}

impl ChromeTarget {
    pub fn new(id: TargetId, page: Page) -> Self {
        Self { id, page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, SnapshotError> {
        let result = self.page.evaluate(script).await.map_err(map_cdp_error)?;
        result
            .into_value::<T>()
            .map_err(|e| SnapshotError::ScriptError(e.to_string()))
    }
}

#[async_trait]
impl PageTarget for ChromeTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    async fn url(&self) -> Result<String, SnapshotError> {
        let url = self.page.url().await.map_err(map_cdp_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, SnapshotError> {
        let title = self.page.get_title().await.map_err(map_cdp_error)?;
        Ok(title.unwrap_or_default())
    }

    async fn layout_metrics(&self) -> Result<RawLayoutMetrics, SnapshotError> {
        self.eval(LAYOUT_METRICS_JS).await
    }

    async fn scroll_y(&self) -> Result<u32, SnapshotError> {
        let y: f64 = self.eval(SCROLL_Y_JS).await?;
        Ok(y.max(0.0).round() as u32)
    }

    async fn scroll_to(&self, y: u32) -> Result<(), SnapshotError> {
        let script = format!(
            "(() => {{ window.scrollTo({{ top: {y}, left: 0, behavior: 'instant' }}); \
             return true; }})()"
        );
        let _: bool = self.eval(&script).await?;
        Ok(())
    }

    async fn capture_visible(&self) -> Result<Vec<u8>, SnapshotError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        self.page.screenshot(params).await.map_err(|e| match map_cdp_error(e) {
            quota @ SnapshotError::QuotaExceeded(_) => quota,
            gone @ SnapshotError::TargetUnavailable(_) => gone,
            other => SnapshotError::CaptureFailed(other.to_string()),
        })
    }

    async fn outer_html(&self) -> Result<String, SnapshotError> {
        self.eval(OUTER_HTML_JS).await
    }

    async fn links(&self) -> Result<Vec<PageLink>, SnapshotError> {
        self.eval(LINKS_JS).await
    }

    async fn script_sources(&self) -> Result<Vec<String>, SnapshotError> {
        self.eval(SCRIPT_SOURCES_JS).await
    }
}

/// A launched Chrome plus the pages opened through it.
pub struct ChromeSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    targets: RwLock<BTreeMap<TargetId, Arc<ChromeTarget>>>,
    active: RwLock<Option<TargetId>>,
    next_id: AtomicU64,
}

impl ChromeSession {
    pub async fn launch(config: &Config) -> Result<Self, SnapshotError> {
        let browser_config = create_browser_config(config)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SnapshotError::BrowserLaunchFailed(e.to_string()))?;

        // The handler must be polled for any DevTools traffic to flow.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Handler error: {}", e);
                    break;
                }
            }
            info!("Handler stream ended");
        });

        info!("Chrome launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            targets: RwLock::new(BTreeMap::new()),
            active: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Opens `url` in a new page, waits for its first load and makes it the
    /// active target.
    pub async fn open(&self, url: &str) -> Result<Arc<ChromeTarget>, SnapshotError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page(url)
            .await
            .map_err(|e| SnapshotError::TargetUnavailable(format!("cannot open {url}: {e}")))?;

        page.wait_for_navigation().await.map_err(map_cdp_error)?;

        let id = TargetId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let target = Arc::new(ChromeTarget::new(id, page));
        self.targets.write().await.insert(id, target.clone());
        *self.active.write().await = Some(id);

        debug!(target_id = %id, url, "Opened target");
        Ok(target)
    }

    /// Forwards every subsequent load of `target` to `loads`.
    pub async fn watch_loads(
        &self,
        target: &ChromeTarget,
        loads: mpsc::Sender<TargetId>,
    ) -> Result<JoinHandle<()>, SnapshotError> {
        let mut events = target
            .page()
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(map_cdp_error)?;
        let id = target.id();

        Ok(tokio::spawn(async move {
            while events.next().await.is_some() {
                if loads.send(id).await.is_err() {
                    break;
                }
            }
            debug!(target_id = %id, "Load event stream ended");
        }))
    }

    pub async fn set_active(&self, id: TargetId) -> bool {
        if self.targets.read().await.contains_key(&id) {
            *self.active.write().await = Some(id);
            true
        } else {
            false
        }
    }

    pub async fn shutdown(&self) {
        info!("Shutting down Chrome session...");
        self.targets.write().await.clear();
        if let Err(e) = self.browser.lock().await.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        self.handler.abort();
        info!("Chrome session shutdown complete");
    }
}

#[async_trait]
impl TargetResolver for ChromeSession {
    async fn resolve(&self, id: TargetId) -> Option<Arc<dyn PageTarget>> {
        self.targets
            .read()
            .await
            .get(&id)
            .map(|target| target.clone() as Arc<dyn PageTarget>)
    }

    async fn active(&self) -> Option<Arc<dyn PageTarget>> {
        let id = (*self.active.read().await)?;
        self.resolve(id).await
    }
}

//! Trigger protocol
//!
//! Three kinds of event start a snapshot: a page finishing its load, the
//! keyboard command, and an explicit request message. Each resolves a target
//! plus a title and timestamp, then fans out to the HTML saver, the
//! full-page capturer and the metadata saver. The three run concurrently and
//! report independently; there is no atomicity across them.
//!
//! Automatic triggers (page load, command) are de-duplicated per target: while
//! a fan-out for a target is in flight, further automatic triggers for it are
//! dropped. Explicit requests always run, though a screenshot session waits
//! for any other session on the same target to finish.

use crate::{
    is_privileged_url, metrics, naming, ArtifactName, ArtifactSink, CaptureClient,
    CaptureThrottle, Config, FullPageCapturer, HtmlSaver, MetadataSaver, PageTarget, SaveOutcome,
    SettingsStore, SnapshotContext, TargetId, TargetResolver,
};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNTITLED: &str = "Untitled";

/// The three savers behind one trigger.
pub struct Snapshotter {
    pub html: HtmlSaver,
    pub screenshot: FullPageCapturer,
    pub metadata: MetadataSaver,
}

impl Snapshotter {
    pub fn new(html: HtmlSaver, screenshot: FullPageCapturer, metadata: MetadataSaver) -> Self {
        Self {
            html,
            screenshot,
            metadata,
        }
    }

    /// Wires the savers from configuration. `throttle` should be the
    /// process-wide one outside of tests.
    pub fn from_config(
        config: &Config,
        sink: Arc<dyn ArtifactSink>,
        throttle: Arc<CaptureThrottle>,
    ) -> Self {
        let screenshot = FullPageCapturer::new(
            CaptureClient::new(config.retry.clone()),
            throttle,
            sink.clone(),
            config.capture.clone(),
        )
        .with_image_format(config.image_format)
        .with_max_url_len(config.max_data_url_len);

        Self {
            html: HtmlSaver::new(sink.clone(), config.max_data_url_len),
            screenshot,
            metadata: MetadataSaver::new(sink, config.max_data_url_len),
        }
    }

    pub async fn save(
        &self,
        kind: RequestKind,
        target: &dyn PageTarget,
        ctx: &SnapshotContext,
    ) -> TriggerResponse {
        match kind {
            RequestKind::SaveHtml => TriggerResponse::Saved(self.html.save(target, ctx).await),
            RequestKind::SaveScreenshot => {
                TriggerResponse::Saved(self.screenshot.capture_full_page(target, &ctx.name).await)
            }
            RequestKind::SaveMetadata => {
                TriggerResponse::Saved(self.metadata.save(target, ctx).await)
            }
            RequestKind::SaveAll => TriggerResponse::Aggregate {
                success: true,
                results: self.save_all(target, ctx).await,
            },
        }
    }

    /// Runs all three savers concurrently: HTML, screenshot, metadata.
    pub async fn save_all(
        &self,
        target: &dyn PageTarget,
        ctx: &SnapshotContext,
    ) -> Vec<SaveOutcome> {
        let (html, screenshot, metadata) = tokio::join!(
            self.html.save(target, ctx),
            self.screenshot.capture_full_page(target, &ctx.name),
            self.metadata.save(target, ctx),
        );
        vec![html, screenshot, metadata]
    }
}

/// Request kinds of the explicit channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    SaveHtml,
    SaveScreenshot,
    SaveMetadata,
    SaveAll,
}

impl RequestKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "SAVE_HTML_FOR_TAB" => Some(RequestKind::SaveHtml),
            "SAVE_SCREENSHOT_FOR_TAB" => Some(RequestKind::SaveScreenshot),
            "SAVE_METADATA_FOR_TAB" => Some(RequestKind::SaveMetadata),
            "SAVE_ALL_FOR_TAB" => Some(RequestKind::SaveAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::SaveHtml => "SAVE_HTML_FOR_TAB",
            RequestKind::SaveScreenshot => "SAVE_SCREENSHOT_FOR_TAB",
            RequestKind::SaveMetadata => "SAVE_METADATA_FOR_TAB",
            RequestKind::SaveAll => "SAVE_ALL_FOR_TAB",
        }
    }
}

/// `{type, tabId?, tabUrl?}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tab_id: Option<u64>,
    #[serde(default)]
    pub tab_url: Option<String>,
}

impl RequestMessage {
    pub fn new(kind: RequestKind, tab_id: Option<TargetId>) -> Self {
        Self {
            kind: Some(kind.as_str().to_string()),
            tab_id: tab_id.map(|id| id.0),
            tab_url: None,
        }
    }
}

/// The target a request came from, if it came from a page.
#[derive(Debug, Clone, Default)]
pub struct SenderContext {
    pub tab_id: Option<TargetId>,
    pub tab_url: Option<String>,
}

/// Reply on the explicit channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TriggerResponse {
    Saved(SaveOutcome),
    Aggregate { success: bool, results: Vec<SaveOutcome> },
    Failure { success: bool, error: String },
}

impl TriggerResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        TriggerResponse::Failure {
            success: false,
            error: error.into(),
        }
    }

    pub fn success(&self) -> bool {
        match self {
            TriggerResponse::Saved(outcome) => outcome.success,
            TriggerResponse::Aggregate { success, .. }
            | TriggerResponse::Failure { success, .. } => *success,
        }
    }
}

struct InFlight<'a> {
    set: &'a DashSet<TargetId>,
    id: TargetId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

pub struct TriggerDispatcher {
    snapshotter: Arc<Snapshotter>,
    resolver: Arc<dyn TargetResolver>,
    settings: Arc<dyn SettingsStore>,
    command_name: String,
    in_flight: DashSet<TargetId>,
}

impl TriggerDispatcher {
    pub fn new(
        snapshotter: Arc<Snapshotter>,
        resolver: Arc<dyn TargetResolver>,
        settings: Arc<dyn SettingsStore>,
        command_name: impl Into<String>,
    ) -> Self {
        Self {
            snapshotter,
            resolver,
            settings,
            command_name: command_name.into(),
            in_flight: DashSet::new(),
        }
    }

    /// Page-load trigger. Returns `None` when the event was skipped.
    pub async fn on_page_loaded(
        &self,
        target_id: TargetId,
        url: &str,
    ) -> Option<Vec<SaveOutcome>> {
        if url.is_empty() || is_privileged_url(url) {
            debug!(target_id = %target_id, url, "Skipping privileged or empty page");
            return None;
        }

        if !self.settings.auto_capture_enabled(url).await {
            debug!(target_id = %target_id, url, "Automatic capture disabled");
            return None;
        }

        let Some(target) = self.resolver.resolve(target_id).await else {
            warn!(target_id = %target_id, "Loaded target is no longer available");
            return None;
        };

        self.fan_out_once(target.as_ref(), url.to_string(), "page_load").await
    }

    /// Keyboard-command trigger against the active target.
    pub async fn on_command(&self, command: &str) -> Option<Vec<SaveOutcome>> {
        if command != self.command_name {
            return None;
        }

        let Some(target) = self.resolver.active().await else {
            debug!("No active target for command");
            return None;
        };

        let url = match target.url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(target_id = %target.id(), "Cannot read active target URL: {}", e);
                return None;
            }
        };
        if url.is_empty() || is_privileged_url(&url) {
            debug!(target_id = %target.id(), url, "Skipping privileged or empty page");
            return None;
        }

        self.fan_out_once(target.as_ref(), url, "command").await
    }

    /// Explicit-request trigger; always answers.
    pub async fn on_request(
        &self,
        message: RequestMessage,
        sender: SenderContext,
    ) -> TriggerResponse {
        let Some(kind) = message.kind.as_deref().and_then(RequestKind::parse) else {
            debug!(kind = ?message.kind, "Ignoring unknown request type");
            return TriggerResponse::failure("unknown message type");
        };

        let Some(target_id) = message.tab_id.map(TargetId).or(sender.tab_id) else {
            return TriggerResponse::failure("no tabId");
        };

        let Some(target) = self.resolver.resolve(target_id).await else {
            warn!(target_id = %target_id, kind = kind.as_str(), "Requested target unavailable");
            return TriggerResponse::failure(format!("target {target_id} unavailable"));
        };

        let url = match message.tab_url.or(sender.tab_url) {
            Some(url) => url,
            None => target.url().await.unwrap_or_default(),
        };
        let ctx = self.context_for(target.as_ref(), url).await;

        metrics::record_trigger("request");
        info!(target_id = %target_id, kind = kind.as_str(), "Handling explicit request");
        self.snapshotter.save(kind, target.as_ref(), &ctx).await
    }

    /// Parses a JSON request and dispatches it.
    pub async fn on_request_json(&self, raw: &str, sender: SenderContext) -> TriggerResponse {
        match serde_json::from_str::<RequestMessage>(raw) {
            Ok(message) => self.on_request(message, sender).await,
            Err(e) => {
                debug!("Ignoring malformed request: {}", e);
                TriggerResponse::failure("unknown message type")
            }
        }
    }

    async fn fan_out_once(
        &self,
        target: &dyn PageTarget,
        url: String,
        trigger: &'static str,
    ) -> Option<Vec<SaveOutcome>> {
        let Some(_claim) = self.claim(target.id()) else {
            debug!(target_id = %target.id(), trigger, "Snapshot already in flight, skipping");
            return None;
        };

        let ctx = self.context_for(target, url).await;
        metrics::record_trigger(trigger);
        info!(target_id = %ctx.target_id, trigger, url = %ctx.url, "Snapshot triggered");

        Some(self.snapshotter.save_all(target, &ctx).await)
    }

    fn claim(&self, id: TargetId) -> Option<InFlight<'_>> {
        self.in_flight.insert(id).then(|| InFlight {
            set: &self.in_flight,
            id,
        })
    }

    async fn context_for(&self, target: &dyn PageTarget, url: String) -> SnapshotContext {
        let title = match target.title().await {
            Ok(title) if !title.trim().is_empty() => title,
            Ok(_) => UNTITLED.to_string(),
            Err(e) => {
                warn!(target_id = %target.id(), "Cannot read title: {}", e);
                UNTITLED.to_string()
            }
        };

        SnapshotContext {
            target_id: target.id(),
            url,
            name: ArtifactName::new(naming::timestamp_now(), title),
        }
    }
}

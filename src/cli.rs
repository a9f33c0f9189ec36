use crate::{
    ArtifactSink, CaptureThrottle, ChromeSession, Config, FilesystemSink, JsonSettingsStore,
    PageTarget, RequestKind, RequestMessage, SaveOutcome, SenderContext, SettingsStore,
    Snapshotter, TargetId, TargetResolver, TriggerDispatcher,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "page-snapshot")]
#[command(about = "Archive pages as HTML, full-page screenshots and link metadata")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory artifacts are written into")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Settings file holding the automatic capture toggles")]
    pub settings: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Show the browser window")]
    pub headful: bool,

    #[arg(long, help = "Serve Prometheus metrics on this port")]
    pub metrics_port: Option<u16>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a URL and snapshot it once
    Capture {
        #[arg(short, long, help = "URL to snapshot")]
        url: String,

        #[arg(short, long, value_enum, default_value = "all", help = "Artifacts to save")]
        kind: CaptureKind,

        #[arg(long, help = "Extra wait in milliseconds after the page has loaded")]
        wait: Option<u64>,
    },

    /// Open URLs and snapshot them on every load, on the command, or on
    /// JSON requests read from stdin
    Watch {
        #[arg(required = true, help = "URLs to open")]
        urls: Vec<String>,
    },

    /// Inspect or change the automatic capture toggles
    Settings {
        #[arg(value_enum)]
        action: SettingsAction,

        #[arg(long, help = "Apply to this host only")]
        site: Option<String>,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaptureKind {
    Html,
    Screenshot,
    Metadata,
    All,
}

impl CaptureKind {
    pub fn request_kind(&self) -> RequestKind {
        match self {
            CaptureKind::Html => RequestKind::SaveHtml,
            CaptureKind::Screenshot => RequestKind::SaveScreenshot,
            CaptureKind::Metadata => RequestKind::SaveMetadata,
            CaptureKind::All => RequestKind::SaveAll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingsAction {
    Enable,
    Disable,
    Status,
}

/// One line of `watch` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    Command(String),
    Focus(TargetId),
    Request(String),
    Empty,
}

/// `focus <tabId>` switches the active target, a line starting with `{` is
/// a request message, anything else is treated as a command name.
pub fn parse_watch_line(line: &str) -> WatchInput {
    let line = line.trim();
    if line.is_empty() {
        return WatchInput::Empty;
    }
    if let Some(id) = line
        .strip_prefix("focus ")
        .and_then(|id| id.trim().parse::<u64>().ok())
    {
        return WatchInput::Focus(TargetId(id));
    }
    if line.starts_with('{') {
        return WatchInput::Request(line.to_string());
    }
    WatchInput::Command(line.to_string())
}

pub struct CliRunner {
    pub config: Config,
    session: Mutex<Option<Arc<ChromeSession>>>,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Capture { url, kind, wait } => self.run_capture(url, kind, wait).await,
            Commands::Watch { urls } => self.run_watch(urls).await,
            Commands::Settings { action, site } => self.run_settings(action, site).await,
            Commands::Validate { config } => self.validate_config(config).await,
        }
    }

    /// Chrome is only launched by the commands that need it.
    async fn session(&self) -> anyhow::Result<Arc<ChromeSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = Arc::new(
            ChromeSession::launch(&self.config)
                .await
                .context("launching Chrome")?,
        );
        *slot = Some(session.clone());
        Ok(session)
    }

    pub async fn shutdown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await;
        }
    }

    fn dispatcher(&self, session: Arc<ChromeSession>) -> TriggerDispatcher {
        let sink: Arc<dyn ArtifactSink> =
            Arc::new(FilesystemSink::new(self.config.output_dir.clone()));
        let throttle = CaptureThrottle::shared(self.config.capture.min_capture_interval);
        let settings: Arc<dyn SettingsStore> =
            Arc::new(JsonSettingsStore::new(self.config.settings_path.clone()));

        TriggerDispatcher::new(
            Arc::new(Snapshotter::from_config(&self.config, sink, throttle)),
            session,
            settings,
            self.config.command_name.clone(),
        )
    }

    pub async fn run_capture(
        &self,
        url: String,
        kind: CaptureKind,
        wait: Option<u64>,
    ) -> anyhow::Result<()> {
        info!("Taking snapshot of: {}", url);

        let session = self.session().await?;
        let target = session
            .open(&url)
            .await
            .with_context(|| format!("opening {url}"))?;

        if let Some(wait) = wait {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }

        let dispatcher = self.dispatcher(session);
        let mut request = RequestMessage::new(kind.request_kind(), Some(target.id()));
        request.tab_url = Some(url.clone());

        let response = dispatcher.on_request(request, SenderContext::default()).await;
        println!("{}", serde_json::to_string_pretty(&response)?);

        if !response.success() {
            bail!("snapshot of {url} failed");
        }

        println!("Artifacts written to: {}", self.config.output_dir.display());
        Ok(())
    }

    pub async fn run_watch(&self, urls: Vec<String>) -> anyhow::Result<()> {
        let session = self.session().await?;
        let dispatcher = Arc::new(self.dispatcher(session.clone()));
        let (loads_tx, mut loads_rx) = mpsc::channel::<TargetId>(64);

        let mut watchers = Vec::with_capacity(urls.len());
        for url in &urls {
            let target = session
                .open(url)
                .await
                .with_context(|| format!("opening {url}"))?;
            watchers.push(session.watch_loads(&target, loads_tx.clone()).await?);

            // The first load finished before the listener was attached.
            loads_tx.send(target.id()).await?;
            println!("Target {}: {}", target.id(), url);
        }
        drop(loads_tx);

        println!(
            "Watching {} page(s). Type `{}`, `focus <tabId>`, or a JSON request per line.",
            urls.len(),
            self.config.command_name
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                Some(id) = loads_rx.recv() => {
                    let dispatcher = dispatcher.clone();
                    let session = session.clone();
                    tokio::spawn(async move {
                        handle_page_load(dispatcher, session, id).await;
                    });
                }
                line = lines.next_line(), if stdin_open => match line? {
                    Some(line) => self.handle_watch_line(&dispatcher, &session, &line).await?,
                    None => {
                        debug!("stdin closed, still watching page loads");
                        stdin_open = false;
                    }
                },
                else => break,
            }
        }

        for watcher in watchers {
            watcher.abort();
        }
        info!("All watched pages are gone");
        Ok(())
    }

    async fn handle_watch_line(
        &self,
        dispatcher: &TriggerDispatcher,
        session: &ChromeSession,
        line: &str,
    ) -> anyhow::Result<()> {
        match parse_watch_line(line) {
            WatchInput::Empty => {}
            WatchInput::Focus(id) => {
                if session.set_active(id).await {
                    println!("Active target: {id}");
                } else {
                    warn!("Unknown target {}", id);
                }
            }
            WatchInput::Command(name) => match dispatcher.on_command(&name).await {
                Some(outcomes) => print_json(&outcomes)?,
                None => println!("Command `{name}` skipped"),
            },
            WatchInput::Request(raw) => {
                let response = dispatcher.on_request_json(&raw, SenderContext::default()).await;
                print_json(&response)?;
            }
        }
        Ok(())
    }

    pub async fn run_settings(
        &self,
        action: SettingsAction,
        site: Option<String>,
    ) -> anyhow::Result<()> {
        let store = JsonSettingsStore::new(self.config.settings_path.clone());

        let settings = match action {
            SettingsAction::Enable => store.set_enabled(site.as_deref(), true).await?,
            SettingsAction::Disable => store.set_enabled(site.as_deref(), false).await?,
            SettingsAction::Status => store.load().await?,
        };

        println!("Settings: {}", store.path().display());
        println!(
            "  Automatic capture: {}",
            on_off(settings.auto_extract_enabled != Some(false))
        );
        for (host, enabled) in &settings.sites {
            println!("  {host}: {}", on_off(*enabled));
        }
        if let Some(site) = site {
            println!(
                "  Effective for {site}: {}",
                on_off(settings.is_enabled_for(&format!("https://{site}/")))
            );
        }

        Ok(())
    }

    pub async fn validate_config(&self, config_path: PathBuf) -> anyhow::Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: Config = serde_json::from_str(&config_content)?;
        config.validate()?;

        println!("Configuration is valid:");
        println!("  Output directory: {}", config.output_dir.display());
        println!("  Settings file: {}", config.settings_path.display());
        println!("  Settle delay: {:?}", config.capture.settle_delay);
        println!("  Capture spacing: {:?}", config.capture.min_capture_interval);
        println!(
            "  Quota backoff: {:?} x{} up to {} retries",
            config.retry.initial_backoff, config.retry.multiplier, config.retry.max_retries
        );
        println!("  Image format: {:?}", config.image_format);
        println!(
            "  Viewport: {}x{}",
            config.viewport.width, config.viewport.height
        );

        Ok(())
    }
}

async fn handle_page_load(
    dispatcher: Arc<TriggerDispatcher>,
    session: Arc<ChromeSession>,
    id: TargetId,
) {
    let Some(target) = session.resolve(id).await else {
        return;
    };
    let url = match target.url().await {
        Ok(url) => url,
        Err(e) => {
            warn!(target_id = %id, "Cannot read URL after load: {}", e);
            return;
        }
    };

    if let Some(outcomes) = dispatcher.on_page_loaded(id, &url).await {
        info!(
            target_id = %id,
            url = %url,
            outcome = %summarize(&outcomes),
            "Page-load snapshot finished"
        );
        if let Err(e) = print_json(&outcomes) {
            warn!("Cannot print outcomes: {}", e);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// Outcomes of a fan-out in save order, for terse reporting.
pub fn summarize(outcomes: &[SaveOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| {
            let kind = o.kind.map(|k| k.label()).unwrap_or("artifact");
            format!("{kind}={}", if o.success { "ok" } else { "failed" })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactKind;

    #[test]
    fn test_parse_watch_line() {
        assert_eq!(parse_watch_line("  "), WatchInput::Empty);
        assert_eq!(parse_watch_line("focus 3"), WatchInput::Focus(TargetId(3)));
        assert_eq!(
            parse_watch_line("extract_now"),
            WatchInput::Command("extract_now".to_string())
        );
        assert_eq!(
            parse_watch_line(r#"{"type":"SAVE_ALL_FOR_TAB","tabId":1}"#),
            WatchInput::Request(r#"{"type":"SAVE_ALL_FOR_TAB","tabId":1}"#.to_string())
        );
        assert_eq!(
            parse_watch_line("focus x"),
            WatchInput::Command("focus x".to_string())
        );
    }

    #[test]
    fn test_cli_parses_capture() {
        let cli = Cli::try_parse_from([
            "page-snapshot",
            "--output-dir",
            "out",
            "capture",
            "--url",
            "https://example.com",
            "--kind",
            "screenshot",
        ])
        .unwrap();

        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        match cli.command {
            Commands::Capture { url, kind, wait } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(kind.request_kind(), RequestKind::SaveScreenshot);
                assert!(wait.is_none());
            }
            _ => panic!("expected capture"),
        }
    }

    #[test]
    fn test_summarize_outcomes() {
        let outcomes = vec![
            SaveOutcome::single(ArtifactKind::Html, 1),
            SaveOutcome::failed(
                ArtifactKind::Screenshot,
                &crate::SnapshotError::CaptureFailed("boom".to_string()),
            ),
        ];
        assert_eq!(summarize(&outcomes), "html=ok screenshot=failed");
    }

    #[tokio::test]
    async fn test_settings_command_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CliRunner::new(Config {
            settings_path: dir.path().join("settings.json"),
            ..Default::default()
        });

        runner
            .run_settings(SettingsAction::Disable, Some("example.org".to_string()))
            .await
            .unwrap();

        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert!(!store.auto_capture_enabled("https://example.org/page").await);
        assert!(store.auto_capture_enabled("https://example.com/").await);
    }
}

//! # Page Snapshot
//!
//! Archives what a page looked like and what it contained. Each snapshot is
//! three independent artifacts written side by side:
//!
//! - the serialized DOM (`{timestamp}-{title}.html`)
//! - a full-page screenshot, captured viewport by viewport while scrolling
//!   (`{timestamp}-{title}-part{N}.png`, or unsuffixed for short pages)
//! - link and script metadata (`{timestamp}-{title}.json`)
//!
//! Snapshots are triggered by a page finishing its load, by a keyboard-style
//! command against the active page, or by an explicit request message.
//!
//! ## Capture pacing
//!
//! Viewport captures share a per-second platform quota across the whole
//! browser. Two mechanisms keep the pipeline under it:
//!
//! | Mechanism | Default | Scope |
//! |-----------|---------|-------|
//! | Minimum capture spacing | 700ms from the last successful capture | process |
//! | Quota backoff | 300ms, doubling, 5 retries | one capture |
//! | Settle delay | 250ms after each scroll | one segment |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_snapshot::{
//!     CaptureThrottle, ChromeSession, Config, FilesystemSink, JsonSettingsStore, PageTarget,
//!     RequestKind, RequestMessage, SenderContext, Snapshotter, TriggerDispatcher,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = Arc::new(ChromeSession::launch(&config).await?);
//!     let target = session.open("https://example.com").await?;
//!
//!     let snapshotter = Snapshotter::from_config(
//!         &config,
//!         Arc::new(FilesystemSink::new(config.output_dir.clone())),
//!         CaptureThrottle::shared(config.capture.min_capture_interval),
//!     );
//!     let dispatcher = TriggerDispatcher::new(
//!         Arc::new(snapshotter),
//!         session.clone(),
//!         Arc::new(JsonSettingsStore::new(config.settings_path.clone())),
//!         config.command_name.clone(),
//!     );
//!
//!     let request = RequestMessage::new(RequestKind::SaveAll, Some(target.id()));
//!     let response = dispatcher.on_request(request, SenderContext::default()).await;
//!     println!("{}", serde_json::to_string(&response)?);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! page-snapshot capture --url https://example.com --kind all
//! page-snapshot watch https://example.com https://example.org
//! page-snapshot settings disable --site example.org
//! ```

/// Configuration and settings for the snapshot tool
pub mod config;

/// Error types shared by the whole pipeline
pub mod error;

/// The page abstraction the pipeline drives
pub mod target;

/// Page geometry and scroll planning
pub mod inspector;

/// Scroll control
pub mod scroll;

/// Process-wide capture spacing
pub mod throttle;

/// Quota-aware viewport capture
pub mod capture;

/// Full-page capture orchestration
pub mod full_page;

/// Artifact filename conventions
pub mod naming;

/// Payload encoding fallback chain
pub mod encoding;

/// Artifact persistence
pub mod sink;

/// HTML and metadata savers
pub mod savers;

/// Automatic capture toggles
pub mod settings;

/// Trigger protocol and fan-out
pub mod trigger;

/// Chrome DevTools-backed targets
pub mod chrome;

/// Prometheus counters and histograms
pub mod metrics;

/// Command-line interface implementation
pub mod cli;


pub use capture::*;
pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use encoding::*;
pub use error::*;
pub use full_page::*;
pub use naming::*;
pub use savers::*;
pub use settings::*;
pub use sink::*;
pub use target::*;
pub use throttle::*;
pub use trigger::*;

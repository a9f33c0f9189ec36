//! Configuration management with serde serialization/deserialization
//!
//! This module provides all configuration structures for the snapshot tool,
//! including capture pacing, quota retry policy, browser launch settings and
//! artifact output locations.

use crate::SnapshotError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the snapshot tool
///
/// Controls the capture pipeline timings, the quota retry policy, where
/// artifacts and settings live, and how Chrome is launched.
///
/// # Examples
///
/// ```rust
/// use page_snapshot::Config;
///
/// // Use default configuration
/// let config = Config::default();
/// assert_eq!(config.command_name, "extract_now");
///
/// // Create custom configuration
/// let config = Config {
///     output_dir: "archive".into(),
///     headless: false,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory artifacts are written into (default: `snapshots`)
    pub output_dir: PathBuf,

    /// JSON file holding the automatic capture toggles (default: `settings.json`)
    pub settings_path: PathBuf,

    /// Pacing of the scroll-and-capture loop
    pub capture: CaptureSettings,

    /// Backoff policy applied when the platform capture quota is hit
    pub retry: RetryConfig,

    /// Browser viewport used when launching Chrome
    pub viewport: Viewport,

    /// Encoding of persisted screenshot segments (default: PNG)
    pub image_format: ImageFormat,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Run Chrome without a window (default: true)
    pub headless: bool,

    /// Custom User-Agent string (default: Chrome default)
    pub user_agent: Option<String>,

    /// Keyboard command that triggers a snapshot of the active target
    pub command_name: String,

    /// Longest data URL the encoders will produce before giving up on that
    /// strategy (default: 32 MiB)
    pub max_data_url_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("snapshots"),
            settings_path: PathBuf::from("settings.json"),
            capture: CaptureSettings::default(),
            retry: RetryConfig::default(),
            viewport: Viewport::default(),
            image_format: ImageFormat::Png,
            chrome_path: None,
            headless: true,
            user_agent: None,
            command_name: "extract_now".to_string(),
            max_data_url_len: 32 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Rejects settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(SnapshotError::ConfigurationError(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.retry.initial_backoff.is_zero() {
            return Err(SnapshotError::ConfigurationError(
                "Initial quota backoff must be greater than 0".to_string(),
            ));
        }

        if self.retry.multiplier < 1.0 {
            return Err(SnapshotError::ConfigurationError(
                "Backoff multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.command_name.trim().is_empty() {
            return Err(SnapshotError::ConfigurationError(
                "Command name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Timing of the full-page capture loop
///
/// The settle delay lets repaints and lazy content land after each scroll.
/// The minimum capture interval is a proactive throttle measured from the end
/// of the previous successful capture anywhere in the process; it keeps the
/// loop under the platform quota so the reactive backoff in [`RetryConfig`]
/// is rarely needed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Wait after each scroll before capturing (default: 250ms)
    pub settle_delay: Duration,

    /// Minimum spacing between successful captures (default: 700ms)
    pub min_capture_interval: Duration,

    /// Pause after each persisted screenshot part (default: 100ms)
    pub persist_pause: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(250),
            min_capture_interval: Duration::from_millis(700),
            persist_pause: Duration::from_millis(100),
        }
    }
}

/// Quota backoff policy for viewport captures
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 5)
    pub max_retries: usize,
    /// First backoff delay (default: 300ms)
    pub initial_backoff: Duration,
    /// Growth factor applied after every retry (default: 2.0)
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(300),
            multiplier: 2.0,
        }
    }
}

/// Browser viewport configuration
///
/// # Examples
///
/// ```rust
/// use page_snapshot::Viewport;
///
/// let laptop = Viewport { width: 1366, height: 768 };
/// assert!(laptop.width > laptop.height);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Supported encodings for persisted screenshot segments
///
/// Captures always come back from the browser as PNG; JPEG output is
/// re-encoded before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ImageFormat {
    /// PNG format - lossless, as captured
    Png,
    /// JPEG format - re-encoded, smaller files
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// # Examples
///
/// ```rust
/// use page_snapshot::{Config, get_chrome_args};
///
/// let config = Config::default();
/// let args = get_chrome_args(&config);
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/page-snapshot-{}", unique_id),
    ];

    if config.headless {
        args.insert(0, "--headless".to_string());
        args.push("--disable-gpu".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, SnapshotError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(SnapshotError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capture.settle_delay, Duration::from_millis(250));
        assert_eq!(config.capture.min_capture_interval, Duration::from_millis(700));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(300));
        assert_eq!(config.image_format, ImageFormat::Png);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"output_dir": "out", "headless": false}"#).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(!config.headless);
        assert_eq!(config.command_name, "extract_now");
    }

    #[test]
    fn test_validate_rejects_zero_viewport() {
        let config = Config {
            viewport: Viewport { width: 0, height: 600 },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SnapshotError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_chrome_args_generation() {
        let config = Config {
            headless: false,
            ..Default::default()
        };
        let args = get_chrome_args(&config);

        assert!(!args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
    }
}

//! Toggles gating automatic snapshots.
//!
//! The store is keyed globally (`autoExtractEnabled`) and per site (by host).
//! A missing value at either level means enabled; a site entry overrides the
//! global flag.

use crate::SnapshotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Whether page loads of `url` may trigger a snapshot.
    async fn auto_capture_enabled(&self, url: &str) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_extract_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sites: BTreeMap<String, bool>,
}

impl StoredSettings {
    pub fn is_enabled_for(&self, url: &str) -> bool {
        if let Some(host) = host_of(url) {
            if let Some(enabled) = self.sites.get(&host) {
                return *enabled;
            }
        }
        self.auto_extract_enabled != Some(false)
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Settings kept in a JSON file. Reads hit the file every time, so edits
/// made by another process take effect on the next page load.
pub struct JsonSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store.
    pub async fn load(&self) -> Result<StoredSettings, SnapshotError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sets the global flag, or the flag for `site` when given.
    pub async fn set_enabled(
        &self,
        site: Option<&str>,
        enabled: bool,
    ) -> Result<StoredSettings, SnapshotError> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await?;

        match site {
            Some(site) => {
                settings.sites.insert(site.to_ascii_lowercase(), enabled);
            }
            None => settings.auto_extract_enabled = Some(enabled),
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&settings)?).await?;
        debug!(path = %self.path.display(), ?site, enabled, "Updated settings");
        Ok(settings)
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn auto_capture_enabled(&self, url: &str) -> bool {
        match self.load().await {
            Ok(settings) => settings.is_enabled_for(url),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    "Unreadable settings, treating as enabled: {}", e
                );
                true
            }
        }
    }
}

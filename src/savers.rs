//! HTML and metadata savers, the siblings of the full-page capturer.

use crate::encoding::{persist_with_fallback, PayloadEncoding};
use crate::{
    metrics, ArtifactId, ArtifactKind, ArtifactName, ArtifactSink, PageLink, PageTarget,
    SnapshotError, TargetId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// What a single saver reports back.
///
/// Serialises to the request-protocol shape: `{success, downloadId}` for
/// single-file savers, `{success, downloadIds}` for screenshots and
/// `{success: false, error}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    #[serde(skip)]
    pub kind: Option<ArtifactKind>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<ArtifactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_ids: Option<Vec<ArtifactId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    pub fn single(kind: ArtifactKind, id: ArtifactId) -> Self {
        Self {
            kind: Some(kind),
            success: true,
            download_id: Some(id),
            download_ids: None,
            error: None,
        }
    }

    pub fn many(kind: ArtifactKind, ids: Vec<ArtifactId>) -> Self {
        Self {
            kind: Some(kind),
            success: true,
            download_id: None,
            download_ids: Some(ids),
            error: None,
        }
    }

    pub fn failed(kind: ArtifactKind, err: &SnapshotError) -> Self {
        Self {
            kind: Some(kind),
            success: false,
            download_id: None,
            download_ids: None,
            error: Some(err.to_string()),
        }
    }
}

/// Identity and naming inputs shared by the three savers for one trigger.
#[derive(Debug, Clone)]
pub struct SnapshotContext {
    pub target_id: TargetId,
    pub url: String,
    pub name: ArtifactName,
}

impl SnapshotContext {
    pub fn timestamp(&self) -> &str {
        &self.name.timestamp
    }

    pub fn title(&self) -> &str {
        &self.name.title
    }
}

/// Persists `document.documentElement.outerHTML`.
pub struct HtmlSaver {
    sink: Arc<dyn ArtifactSink>,
    max_url_len: usize,
}

impl HtmlSaver {
    pub fn new(sink: Arc<dyn ArtifactSink>, max_url_len: usize) -> Self {
        Self { sink, max_url_len }
    }

    pub async fn save(&self, target: &dyn PageTarget, ctx: &SnapshotContext) -> SaveOutcome {
        match self.try_save(target, ctx).await {
            Ok(id) => SaveOutcome::single(ArtifactKind::Html, id),
            Err(e) => {
                metrics::record_sink_failure(ArtifactKind::Html);
                error!(target_id = %ctx.target_id, "Error saving HTML: {}", e);
                SaveOutcome::failed(ArtifactKind::Html, &e)
            }
        }
    }

    async fn try_save(
        &self,
        target: &dyn PageTarget,
        ctx: &SnapshotContext,
    ) -> Result<ArtifactId, SnapshotError> {
        let html = target.outer_html().await?;
        let filename = ctx.name.filename("html");

        let id = persist_with_fallback(
            self.sink.as_ref(),
            html.as_bytes(),
            "text/html",
            &filename,
            PayloadEncoding::DOCUMENT_CHAIN,
            self.max_url_len,
        )
        .await?;

        info!(target_id = %ctx.target_id, filename = %filename, artifact_id = id, "Saved HTML");
        Ok(id)
    }
}

/// The JSON document written by [`MetadataSaver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub url: String,
    pub saved_at: String,
    pub title: String,
    pub links: Vec<PageLink>,
    pub javascript_files_urls: Vec<String>,
}

/// Keeps `https` script sources, first occurrence of each.
pub fn filter_script_urls(sources: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|src| src.starts_with("https"))
        .filter(|src| seen.insert(src.clone()))
        .collect()
}

/// Persists links and script URLs as pretty-printed JSON.
pub struct MetadataSaver {
    sink: Arc<dyn ArtifactSink>,
    max_url_len: usize,
}

impl MetadataSaver {
    pub fn new(sink: Arc<dyn ArtifactSink>, max_url_len: usize) -> Self {
        Self { sink, max_url_len }
    }

    pub async fn collect(
        &self,
        target: &dyn PageTarget,
        ctx: &SnapshotContext,
    ) -> Result<PageMetadata, SnapshotError> {
        let links = target.links().await?;
        let scripts = target.script_sources().await?;

        Ok(PageMetadata {
            url: ctx.url.clone(),
            saved_at: ctx.timestamp().to_string(),
            title: ctx.title().to_string(),
            links,
            javascript_files_urls: filter_script_urls(scripts),
        })
    }

    pub async fn save(&self, target: &dyn PageTarget, ctx: &SnapshotContext) -> SaveOutcome {
        match self.try_save(target, ctx).await {
            Ok(id) => SaveOutcome::single(ArtifactKind::Metadata, id),
            Err(e) => {
                metrics::record_sink_failure(ArtifactKind::Metadata);
                error!(target_id = %ctx.target_id, "Error saving JSON: {}", e);
                SaveOutcome::failed(ArtifactKind::Metadata, &e)
            }
        }
    }

    async fn try_save(
        &self,
        target: &dyn PageTarget,
        ctx: &SnapshotContext,
    ) -> Result<ArtifactId, SnapshotError> {
        let metadata = self.collect(target, ctx).await?;
        let json = serde_json::to_string_pretty(&metadata)?;
        let filename = ctx.name.filename("json");

        let id = persist_with_fallback(
            self.sink.as_ref(),
            json.as_bytes(),
            "application/json",
            &filename,
            PayloadEncoding::BINARY_CHAIN,
            self.max_url_len,
        )
        .await?;

        info!(
            target_id = %ctx.target_id,
            filename = %filename,
            artifact_id = id,
            links = metadata.links.len(),
            scripts = metadata.javascript_files_urls.len(),
            "Saved JSON metadata"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_script_urls() {
        let sources = vec![
            "https://cdn.example.com/a.js".to_string(),
            "http://insecure.example.com/b.js".to_string(),
            "https://cdn.example.com/a.js".to_string(),
            "https://cdn.example.com/c.js".to_string(),
        ];
        assert_eq!(
            filter_script_urls(sources),
            vec![
                "https://cdn.example.com/a.js".to_string(),
                "https://cdn.example.com/c.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_outcome_wire_shapes() {
        let html = serde_json::to_value(SaveOutcome::single(ArtifactKind::Html, 4)).unwrap();
        assert_eq!(html, serde_json::json!({"success": true, "downloadId": 4}));

        let shots =
            serde_json::to_value(SaveOutcome::many(ArtifactKind::Screenshot, vec![1, 2])).unwrap();
        assert_eq!(shots, serde_json::json!({"success": true, "downloadIds": [1, 2]}));

        let failed = SaveOutcome::failed(
            ArtifactKind::Metadata,
            &SnapshotError::TargetUnavailable("tab 3 closed".to_string()),
        );
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            serde_json::json!({"success": false, "error": "Target unavailable: tab 3 closed"})
        );
    }

    #[test]
    fn test_metadata_field_names() {
        let metadata = PageMetadata {
            url: "https://example.com".to_string(),
            saved_at: "20240101-123045000".to_string(),
            title: "Example".to_string(),
            links: vec![],
            javascript_files_urls: vec![],
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("savedAt").is_some());
        assert!(value.get("javascriptFilesUrls").is_some());
    }
}

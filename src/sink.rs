//! Where artifacts end up.

use crate::SnapshotError;
use async_trait::async_trait;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Identifier handed back by a sink for a persisted artifact.
pub type ArtifactId = u64;

/// A payload as handed to a sink: either the bytes themselves (the
/// equivalent of an object reference) or a self-contained data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Reference(Vec<u8>),
    DataUrl(String),
}

impl Payload {
    /// Decodes the payload back into raw bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>, SnapshotError> {
        match self {
            Payload::Reference(bytes) => Ok(bytes),
            Payload::DataUrl(url) => decode_data_url(&url),
        }
    }
}

/// Parses `data:[<mime>][;base64],<data>`.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, SnapshotError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| SnapshotError::SinkError("not a data URL".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| SnapshotError::SinkError("data URL has no payload separator".to_string()))?;

    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| SnapshotError::SinkError(format!("invalid base64 payload: {e}")))
    } else {
        Ok(urlencoding::decode_binary(data.as_bytes()).into_owned())
    }
}

/// Persists a named payload. Opaque beyond this contract.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(&self, payload: Payload, filename: &str) -> Result<ArtifactId, SnapshotError>;

    /// Whether [`Payload::Reference`] is accepted. Sinks that only take URLs
    /// force the encoders down to data URLs.
    fn accepts_references(&self) -> bool {
        true
    }
}

/// Writes artifacts as files in one directory.
///
/// Names are expected to be already sanitised; anything that could escape
/// the directory is rejected. An existing file is never overwritten: the
/// name gets `_1`, `_2`, … before its extension instead.
#[derive(Debug)]
pub struct FilesystemSink {
    root: PathBuf,
    next_id: AtomicU64,
}

impl FilesystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn validate_name(filename: &str) -> Result<(), SnapshotError> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
        {
            return Err(SnapshotError::SinkError(format!(
                "invalid filename: {filename:?}"
            )));
        }
        Ok(())
    }

    fn candidate_name(filename: &str, attempt: usize) -> String {
        if attempt == 0 {
            return filename.to_string();
        }
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{attempt}.{ext}"),
            _ => format!("{filename}_{attempt}"),
        }
    }

    async fn create_unique(&self, filename: &str) -> Result<(fs::File, PathBuf), SnapshotError> {
        for attempt in 0..1000 {
            let path = self.root.join(Self::candidate_name(filename, attempt));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SnapshotError::SinkError(e.to_string())),
            }
        }
        Err(SnapshotError::SinkError(format!(
            "no free name left for {filename}"
        )))
    }
}

/// Writes `bytes` to a freshly created file. On failure the file is removed,
/// so no truncated artifact is left behind.
async fn write_or_discard<W>(mut out: W, path: &Path, bytes: &[u8]) -> Result<(), SnapshotError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(bytes).await?;
        out.flush().await
    }
    .await;
    drop(out);

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(path).await {
            warn!(path = %path.display(), "Failed to remove partial artifact: {}", cleanup);
        }
        return Err(SnapshotError::SinkError(e.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ArtifactSink for FilesystemSink {
    async fn persist(&self, payload: Payload, filename: &str) -> Result<ArtifactId, SnapshotError> {
        Self::validate_name(filename)?;
        let bytes = payload.into_bytes()?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SnapshotError::SinkError(e.to_string()))?;

        let (file, path) = self.create_unique(filename).await?;
        write_or_discard(file, &path, &bytes).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            artifact_id = id,
            path = %path.display(),
            bytes = bytes.len(),
            "Persisted artifact"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_decode_data_urls() {
        assert_eq!(
            decode_data_url("data:text/html;base64,PHA+aGk8L3A+").unwrap(),
            b"<p>hi</p>".to_vec()
        );
        assert_eq!(
            decode_data_url("data:text/html;charset=utf-8,%3Cp%3Ehi%3C%2Fp%3E").unwrap(),
            b"<p>hi</p>".to_vec()
        );
        assert!(decode_data_url("blob:abc").is_err());
    }

    #[tokio::test]
    async fn test_filesystem_sink_writes_and_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path().join("out"));

        let first = sink
            .persist(Payload::Reference(b"one".to_vec()), "page.html")
            .await
            .unwrap();
        let second = sink
            .persist(Payload::DataUrl("data:text/plain;base64,dHdv".to_string()), "page.html")
            .await
            .unwrap();

        assert!(second > first);
        let out = dir.path().join("out");
        assert_eq!(std::fs::read(out.join("page.html")).unwrap(), b"one");
        assert_eq!(std::fs::read(out.join("page_1.html")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, b"<ht").unwrap();

        let result = write_or_discard(FullDisk, &path, b"<html></html>").await;

        match result {
            Err(SnapshotError::SinkError(message)) => assert!(message.contains("no space left")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_filesystem_sink_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FilesystemSink::new(dir.path());

        let result = sink
            .persist(Payload::Reference(Vec::new()), "../escape.html")
            .await;
        assert!(matches!(result, Err(SnapshotError::SinkError(_))));
    }
}

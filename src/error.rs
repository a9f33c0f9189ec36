use thiserror::Error;

/// Failures surfaced by the snapshot pipeline.
///
/// `QuotaExceeded` is transient and only ever seen inside the capture client's
/// retry loop; once retries run out it escalates to `CaptureFailed`. `SinkError`
/// is scoped to a single artifact write and never aborts a capture session.
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Capture quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Artifact sink error: {0}")]
    SinkError(String),

    #[error("All payload encodings failed: {0}")]
    EncodingFallbackExhausted(String),

    #[error("Script evaluation failed: {0}")]
    ScriptError(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SnapshotError {
    /// Only the platform capture quota is worth retrying; everything else is
    /// either terminal for the session or scoped to one artifact.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SnapshotError::QuotaExceeded(_))
    }

    /// Whether the failure should abort the whole capture session.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            SnapshotError::SinkError(_) | SnapshotError::EncodingFallbackExhausted(_)
        )
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(SnapshotError::QuotaExceeded("quota".to_string()).is_retryable());
        assert!(!SnapshotError::CaptureFailed("boom".to_string()).is_retryable());
        assert!(!SnapshotError::TargetUnavailable("closed".to_string()).is_retryable());
    }

    #[test]
    fn test_sink_errors_are_scoped_to_one_artifact() {
        assert!(!SnapshotError::SinkError("disk full".to_string()).is_session_fatal());
        assert!(!SnapshotError::EncodingFallbackExhausted("a.png".to_string()).is_session_fatal());
        assert!(SnapshotError::TargetUnavailable("closed".to_string()).is_session_fatal());
    }
}

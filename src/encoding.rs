//! Payload encoding fallback chain.
//!
//! Strategies are tried in order; the first one that both encodes and
//! persists wins. When every strategy fails the last error is reported as
//! [`SnapshotError::EncodingFallbackExhausted`].

use crate::{ArtifactId, ArtifactSink, Payload, SnapshotError};
use base64::Engine;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Hand the bytes over as-is.
    ObjectReference,
    /// `data:<mime>;base64,…`
    Base64DataUrl,
    /// `data:<mime>;charset=utf-8,…`, percent-encoded. Largest, last resort.
    PercentDataUrl,
}

impl PayloadEncoding {
    /// HTML documents get the full chain.
    pub const DOCUMENT_CHAIN: &'static [PayloadEncoding] = &[
        PayloadEncoding::ObjectReference,
        PayloadEncoding::Base64DataUrl,
        PayloadEncoding::PercentDataUrl,
    ];

    /// JSON metadata and images stop at base64.
    pub const BINARY_CHAIN: &'static [PayloadEncoding] = &[
        PayloadEncoding::ObjectReference,
        PayloadEncoding::Base64DataUrl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PayloadEncoding::ObjectReference => "object-reference",
            PayloadEncoding::Base64DataUrl => "base64-data-url",
            PayloadEncoding::PercentDataUrl => "percent-data-url",
        }
    }

    /// Encodes `bytes` for `sink`. Fails when the sink cannot take references
    /// or the resulting URL would exceed `max_url_len`.
    pub fn encode(
        &self,
        bytes: &[u8],
        mime: &str,
        sink: &dyn ArtifactSink,
        max_url_len: usize,
    ) -> Result<Payload, SnapshotError> {
        let url = match self {
            PayloadEncoding::ObjectReference => {
                if !sink.accepts_references() {
                    return Err(SnapshotError::SinkError(
                        "sink does not accept object references".to_string(),
                    ));
                }
                return Ok(Payload::Reference(bytes.to_vec()));
            }
            PayloadEncoding::Base64DataUrl => format!(
                "data:{};base64,{}",
                mime,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            ),
            PayloadEncoding::PercentDataUrl => format!(
                "data:{};charset=utf-8,{}",
                mime,
                urlencoding::encode_binary(bytes)
            ),
        };

        if url.len() > max_url_len {
            return Err(SnapshotError::SinkError(format!(
                "{} payload of {} bytes exceeds the {} byte limit",
                self.name(),
                url.len(),
                max_url_len
            )));
        }
        Ok(Payload::DataUrl(url))
    }
}

/// Persists `bytes` under `filename`, walking `chain` until one encoding
/// succeeds.
pub async fn persist_with_fallback(
    sink: &dyn ArtifactSink,
    bytes: &[u8],
    mime: &str,
    filename: &str,
    chain: &[PayloadEncoding],
    max_url_len: usize,
) -> Result<ArtifactId, SnapshotError> {
    let mut last_error = None;

    for encoding in chain {
        let attempt = match encoding.encode(bytes, mime, sink, max_url_len) {
            Ok(payload) => sink.persist(payload, filename).await,
            Err(e) => Err(e),
        };

        match attempt {
            Ok(id) => {
                debug!(
                    filename,
                    encoding = encoding.name(),
                    artifact_id = id,
                    "Artifact persisted"
                );
                return Ok(id);
            }
            Err(e) => {
                warn!(filename, encoding = encoding.name(), "Encoding attempt failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(SnapshotError::EncodingFallbackExhausted(match last_error {
        Some(e) => format!("{filename}: {e}"),
        None => format!("{filename}: no encodings to try"),
    }))
}

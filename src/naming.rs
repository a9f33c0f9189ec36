//! Artifact filenames: `{timestamp}-{title}.{ext}`, with `-part{N}` before the
//! extension for multi-segment screenshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an artifact holds; decides the extension and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Html,
    Screenshot,
    Metadata,
}

impl ArtifactKind {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Metadata => "metadata",
        }
    }
}

/// UTC timestamp that sorts lexically: the ISO-8601 form with `:`, `.` and
/// `-` stripped, `T` turned into `-` and the trailing `Z` dropped, e.g.
/// `20240101-123045123` for `2024-01-01T12:30:45.123Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S%3f").to_string()
}

pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
pub fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Everything needed to derive deterministic filenames for one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub timestamp: String,
    pub title: String,
}

impl ArtifactName {
    pub fn new(timestamp: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            title: title.into(),
        }
    }

    /// `{timestamp}-{sanitizedTitle}.{ext}`
    pub fn filename(&self, ext: &str) -> String {
        format!("{}-{}.{}", self.timestamp, sanitize_component(&self.title), ext)
    }

    /// Filename of segment `index` (0-based) out of `total`. A single segment
    /// keeps the base name; otherwise parts are numbered from 1.
    pub fn segment_filename(&self, ext: &str, index: usize, total: usize) -> String {
        let base = self.filename(ext);
        if total <= 1 {
            base
        } else {
            part_filename(&base, index + 1)
        }
    }
}

/// Inserts `-part{part}` before the extension of `base`.
pub fn part_filename(base: &str, part: usize) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-part{part}.{ext}"),
        _ => format!("{base}-part{part}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(format_timestamp(at), "20240101-123045123");
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Example Page"), "Example_Page");
        assert_eq!(sanitize_component("a/b\\c:d?"), "a_b_c_d_");
        assert_eq!(sanitize_component("v1.2-final_draft"), "v1.2-final_draft");
        assert_eq!(sanitize_component("Café"), "Caf_");
    }

    #[test]
    fn test_filename_convention() {
        let name = ArtifactName::new("20240101-123045", "Example Page");
        assert_eq!(name.filename("png"), "20240101-123045-Example_Page.png");
        assert_eq!(name.filename("json"), "20240101-123045-Example_Page.json");
    }

    #[test]
    fn test_segment_filenames() {
        let name = ArtifactName::new("20240101-123045", "foo");
        assert_eq!(name.segment_filename("png", 0, 1), "20240101-123045-foo.png");
        assert_eq!(
            name.segment_filename("png", 2, 3),
            "20240101-123045-foo-part3.png"
        );
        assert_eq!(part_filename("foo.png", 1), "foo-part1.png");
        assert_eq!(part_filename("noext", 2), "noext-part2");
    }
}

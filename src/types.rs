use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// File Size Helper
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSize(pub u64);

impl FileSize {
    pub const fn bytes(size: u64) -> Self {
        Self(size)
    }

    pub fn as_bytes(&self) -> u64 {
        self.0
    }

    /// Whole KiB, rounded up. A 1-byte file reports as 1 KB.
    pub fn as_kilobytes_ceil(&self) -> u64 {
        self.0.div_ceil(1024)
    }
}

// ============================================================================
// MIME Type Helper
// ============================================================================

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MimeType(String);

impl MimeType {
    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into())
    }

    /// The declared type, or `application/octet-stream` when none was declared.
    pub fn effective(declared: &str) -> Self {
        let declared = declared.trim();
        if declared.is_empty() {
            Self::new(OCTET_STREAM)
        } else {
            Self::new(declared)
        }
    }

    /// Best guess from a file name's extension.
    pub fn guess_from_name(name: &str) -> Option<Self> {
        mime_guess::from_path(name)
            .first()
            .map(|m| Self::new(m.essence_str()))
    }

    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }

    pub fn is_text(&self) -> bool {
        self.0.starts_with("text/")
    }

    pub fn is_json(&self) -> bool {
        self.0 == "application/json"
    }

    pub fn is_octet_stream(&self) -> bool {
        self.0 == OCTET_STREAM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-cased extension of a file name, without the dot.
pub fn file_extension(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size() {
        let size = FileSize::bytes(5 * 1024 * 1024);
        assert_eq!(size.as_bytes(), 5 * 1024 * 1024);
        assert_eq!(size.as_kilobytes_ceil(), 5 * 1024);
    }

    #[test]
    fn test_kilobytes_round_up() {
        assert_eq!(FileSize::bytes(0).as_kilobytes_ceil(), 0);
        assert_eq!(FileSize::bytes(1).as_kilobytes_ceil(), 1);
        assert_eq!(FileSize::bytes(2048).as_kilobytes_ceil(), 2);
        assert_eq!(FileSize::bytes(2049).as_kilobytes_ceil(), 3);
    }

    #[test]
    fn test_effective_mime_type() {
        assert_eq!(MimeType::effective("").as_str(), OCTET_STREAM);
        assert_eq!(MimeType::effective("text/plain").as_str(), "text/plain");
        assert!(MimeType::effective("  ").is_octet_stream());
    }

    #[test]
    fn test_mime_type() {
        let mime = MimeType::new("image/jpeg");
        assert!(mime.is_image());
        assert!(!mime.is_text());
        assert!(MimeType::new("application/json").is_json());
    }

    #[test]
    fn test_guess_from_name() {
        let guessed = MimeType::guess_from_name("photo.PNG").unwrap();
        assert!(guessed.is_image());
        assert!(MimeType::guess_from_name("no_extension").is_none());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("Notes.MD").as_deref(), Some("md"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("Makefile"), None);
    }
}

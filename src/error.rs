use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Main Error Type
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // Convenience constructors
    pub fn file_too_large(name: &str, limit_bytes: u64) -> Self {
        Self::new(
            ErrorCode::FileTooLarge,
            format!("'{}' exceeds the {}MB limit.", name, limit_bytes / (1024 * 1024)),
        )
        .with_details(serde_json::json!({ "file": name, "limit_bytes": limit_bytes }))
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn upstream_status(endpoint: &str, status: u16) -> Self {
        Self::new(
            ErrorCode::UpstreamStatus,
            format!("{} responded with status {}", endpoint, status),
        )
        .with_details(serde_json::json!({ "status": status }))
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Protocol, message)
    }

    pub fn image(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ImageProcessing, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Operation cancelled")
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// HTTP status carried by an `UpstreamStatus` error.
    pub fn status(&self) -> Option<u16> {
        self.details
            .as_ref()?
            .get("status")?
            .as_u64()
            .map(|s| s as u16)
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Error Codes
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Caller input
    FileTooLarge,
    InvalidInput,
    Config,

    // Network / backend
    Transport,
    UpstreamStatus,
    Protocol,

    // Local processing
    ImageProcessing,
    Io,

    Cancelled,
}

impl ErrorCode {
    /// Whether a generation call that failed with this code may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport | Self::UpstreamStatus | Self::Protocol | Self::Io
        )
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::FileTooLarge | Self::InvalidInput | Self::Config)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Config => "CONFIG_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::UpstreamStatus => "UPSTREAM_STATUS",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Io => "IO_ERROR",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Error Conversion Implementations
// ============================================================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::upstream_status(
                err.url().map(|u| u.as_str()).unwrap_or("backend"),
                status.as_u16(),
            ),
            None => Self::transport(format!("HTTP error: {}", err)),
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        Self::image(format!("Image error: {}", err))
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        Self::invalid_input(format!("Base64 error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, format!("IO error: {}", err))
    }
}

impl From<std::convert::Infallible> for AppError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(ErrorCode::Io, format!("Background task failed: {}", err))
    }
}

// ============================================================================
// Error Context Extension
// ============================================================================

pub trait ErrorContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<AppError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let mut err = e.into();
            err.message = format!("{}: {}", context.into(), err.message);
            err
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn log_error(error: &AppError) {
    if error.code.is_input_error() || error.is_cancelled() {
        log::warn!("{}", error);
    } else {
        log::error!("{}", error);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_too_large_names_file() {
        let err = AppError::file_too_large("report.pdf", 30 * 1024 * 1024);
        assert_eq!(err.code, ErrorCode::FileTooLarge);
        assert!(err.message.contains("'report.pdf'"));
        assert!(err.message.contains("30MB"));
    }

    #[test]
    fn test_upstream_status_carries_code() {
        let err = AppError::upstream_status("/file-context", 500);
        assert_eq!(err.status(), Some(500));
        assert_eq!(AppError::transport("down").status(), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(ErrorCode::Transport.is_retryable());
        assert!(!ErrorCode::Cancelled.is_retryable());
        assert!(ErrorCode::FileTooLarge.is_input_error());
        assert!(!ErrorCode::Protocol.is_input_error());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::cancelled();
        let display = format!("{}", err);
        assert!(display.contains("CANCELLED"));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_context_prefixes_message() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.context("reading screenshot").unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
        assert!(err.message.starts_with("reading screenshot: "));
    }
}

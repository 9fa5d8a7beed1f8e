use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::init::Config;
use crate::models::{AnalyzedContextFile, ContextFile};
use crate::types::{FileSize, MimeType, file_extension};

pub const MAX_CONTEXT_FILE_SIZE_BYTES: u64 = 30 * 1024 * 1024;
pub const MAX_PREVIEW_CHARS: usize = 12_000;
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

const FILE_CONTEXT_PATH: &str = "file-context";

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "txt", "json", "yaml", "yml", "csv", "log", "xml", "html", "js", "ts", "tsx", "py",
    "java", "go", "rb", "rs", "sql",
];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx"];

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct FileContextResponse {
    files: Vec<RemoteAnalysis>,
}

#[derive(Debug, Deserialize)]
struct RemoteAnalysis {
    name: String,
    size: u64,
    mime_type: String,
    analysis: String,
}

impl RemoteAnalysis {
    /// Attach the backend's result to the upload at the same position.
    fn into_analyzed(self, upload: &ContextFile) -> AnalyzedContextFile {
        if self.name != upload.name {
            log::debug!("Backend renamed '{}' to '{}'", upload.name, self.name);
        }
        AnalyzedContextFile {
            id: Uuid::now_v7(),
            name: upload.name.clone(),
            size: self.size,
            mime_type: self.mime_type,
            analysis: self.analysis,
        }
    }
}

/// Why the remote analysis was skipped.
#[derive(Debug)]
enum Fallback {
    Unreachable(String),
    Unsupported(StatusCode),
    BadPayload(String),
}

impl std::fmt::Display for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(e) => write!(f, "endpoint unreachable: {}", e),
            Self::Unsupported(status) => write!(f, "endpoint unsupported ({})", status),
            Self::BadPayload(e) => write!(f, "unreadable response: {}", e),
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

#[derive(Clone)]
pub struct ContextFileAnalyzer {
    http: reqwest::Client,
    endpoint: String,
}

impl ContextFileAnalyzer {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: config.endpoint(FILE_CONTEXT_PATH),
        }
    }

    /// Analyze `files`, preferring the backend and falling back to local heuristics.
    ///
    /// Fails before any network traffic if a file is over the size limit.
    pub async fn analyze(&self, files: &[ContextFile]) -> Result<Vec<AnalyzedContextFile>> {
        validate_sizes(files)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        match self.analyze_remote(files).await? {
            Ok(analyzed) => {
                log::info!("📎 Backend analyzed {} context file(s)", analyzed.len());
                Ok(analyzed)
            }
            Err(reason) => {
                log::warn!("File-context analysis falling back to local mode: {}", reason);
                Ok(files.iter().map(analyze_locally).collect())
            }
        }
    }

    /// Outer error is a hard failure, inner error asks for the local fallback.
    async fn analyze_remote(
        &self,
        files: &[ContextFile],
    ) -> Result<std::result::Result<Vec<AnalyzedContextFile>, Fallback>> {
        let form = files
            .iter()
            .try_fold(Form::new(), |form, file| Ok::<_, AppError>(form.part("files", file_part(file)?)))?;

        let response = match self.http.post(&self.endpoint).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => return Ok(Err(Fallback::Unreachable(e.to_string()))),
        };

        let status = response.status();
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            return Ok(Err(Fallback::Unsupported(status)));
        }
        if !status.is_success() {
            return Err(AppError::upstream_status(&self.endpoint, status.as_u16()));
        }

        let payload = match response.json::<FileContextResponse>().await {
            Ok(payload) => payload,
            Err(e) => return Ok(Err(Fallback::BadPayload(e.to_string()))),
        };
        if payload.files.len() != files.len() {
            return Ok(Err(Fallback::BadPayload(format!(
                "expected {} results, got {}",
                files.len(),
                payload.files.len()
            ))));
        }

        Ok(Ok(payload
            .files
            .into_iter()
            .zip(files)
            .map(|(remote, upload)| remote.into_analyzed(upload))
            .collect()))
    }
}

fn validate_sizes(files: &[ContextFile]) -> Result<()> {
    match files
        .iter()
        .find(|f| f.size().as_bytes() > MAX_CONTEXT_FILE_SIZE_BYTES)
    {
        Some(oversized) => Err(AppError::file_too_large(
            &oversized.name,
            MAX_CONTEXT_FILE_SIZE_BYTES,
        )),
        None => Ok(()),
    }
}

fn file_part(file: &ContextFile) -> Result<Part> {
    let part = Part::stream_with_length(file.data.clone(), file.size().as_bytes())
        .file_name(file.name.clone());
    let declared = file.mime_type.trim();

    // reqwest rejects unparsable types; send those parts untyped
    if declared.parse::<mime_guess::mime::Mime>().is_ok() {
        return part
            .mime_str(declared)
            .map_err(|e| AppError::invalid_input(format!("{}: {}", file.name, e)));
    }
    Ok(part)
}

// ============================================================================
// Local analysis
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalKind {
    Image,
    Text,
    Document,
    Other,
}

fn classify(file: &ContextFile) -> LocalKind {
    let declared = file.mime_type.trim();
    let mime = if declared.is_empty() {
        MimeType::guess_from_name(&file.name).unwrap_or_else(|| MimeType::effective(""))
    } else {
        MimeType::new(declared)
    };
    let extension = file_extension(&file.name).unwrap_or_default();

    if mime.is_image() {
        LocalKind::Image
    } else if mime.is_text() || mime.is_json() || TEXT_EXTENSIONS.contains(&extension.as_str()) {
        LocalKind::Text
    } else if mime.as_str() == "application/pdf"
        || DOCUMENT_EXTENSIONS.contains(&extension.as_str())
    {
        LocalKind::Document
    } else {
        LocalKind::Other
    }
}

fn text_preview(file: &ContextFile) -> String {
    let content = String::from_utf8_lossy(&file.data);
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return format!("File {} is empty.", file.name);
    }

    match trimmed.char_indices().nth(MAX_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{}", &trimmed[..cut], TRUNCATION_MARKER),
        None => trimmed.to_string(),
    }
}

fn analyze_locally(file: &ContextFile) -> AnalyzedContextFile {
    let mime_type = file.effective_mime_type();

    let analysis = match classify(file) {
        LocalKind::Image => format!(
            "Image attached: {}. (Local mode, remote image summarization unavailable.)",
            file.name
        ),
        LocalKind::Text => text_preview(file),
        LocalKind::Document => format!(
            "Document attached: {}. (Local mode, remote document analysis unavailable.)",
            file.name
        ),
        LocalKind::Other => {
            let declared = if mime_type.is_octet_stream() && file.mime_type.trim().is_empty() {
                "unknown type"
            } else {
                mime_type.as_str()
            };
            format!(
                "Attached file: {} ({}). Local analysis not available for this file type.",
                file.name, declared
            )
        }
    };

    AnalyzedContextFile {
        id: Uuid::now_v7(),
        name: file.name.clone(),
        size: file.size().as_bytes(),
        mime_type: mime_type.into_string(),
        analysis,
    }
}

// ============================================================================
// Prompt context
// ============================================================================

/// Render analyzed files as the extra-context block handed to prompt construction.
pub fn serialize_context(files: &[AnalyzedContextFile]) -> String {
    files
        .iter()
        .map(|file| {
            format!(
                "File: {} ({} KB)\nType: {}\n\n{}",
                file.name,
                FileSize::bytes(file.size).as_kilobytes_ceil(),
                file.mime_type,
                file.analysis
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

// ============================================================================
// TESTS
// ============================================================================

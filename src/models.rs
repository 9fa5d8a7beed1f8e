use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::types::{FileSize, MimeType};

// ============================================================================
// Generation Requests
// ============================================================================

/// Body of the next-action call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionRequest {
    pub goal: String,
    /// Encoded screenshot (data URL or bare base64).
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_context: Option<FollowUpContext>,
}

impl ActionRequest {
    pub fn new(goal: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = Some(os_name.into());
        self
    }

    pub fn with_completed_steps(mut self, steps: Vec<String>) -> Self {
        self.completed_steps = Some(steps);
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUpContext) -> Self {
        self.follow_up_context = Some(follow_up);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowUpContext {
    pub previous_image: String,
    pub previous_instruction: String,
    pub follow_up_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HelpRequest {
    pub goal: String,
    pub image: String,
    pub user_question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_message: Option<String>,
}

impl HelpRequest {
    pub fn new(
        goal: impl Into<String>,
        image: impl Into<String>,
        user_question: impl Into<String>,
    ) -> Self {
        Self {
            goal: goal.into(),
            image: image.into(),
            user_question: user_question.into(),
            previous_message: None,
        }
    }

    /// An empty previous message is treated as absent.
    pub fn with_previous_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.previous_message = (!message.is_empty()).then_some(message);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionCheckRequest {
    pub instruction: String,
    pub before_image: String,
    pub after_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateRequest {
    pub instruction: String,
    pub image: String,
}

// ============================================================================
// Context Files
// ============================================================================

/// A user-selected file awaiting analysis.
#[derive(Debug, Clone)]
pub struct ContextFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ContextFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, taking the declared type from its extension.
    pub async fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("uploaded-file")
            .to_string();
        let mime_type = MimeType::guess_from_name(&name)
            .map(MimeType::into_string)
            .unwrap_or_default();
        Ok(Self::new(name, mime_type, data))
    }

    pub fn size(&self) -> FileSize {
        FileSize::bytes(self.data.len() as u64)
    }

    pub fn effective_mime_type(&self) -> MimeType {
        MimeType::effective(&self.mime_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzedContextFile {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub analysis: String,
}

// ============================================================================
// Coordinates
// ============================================================================

/// Largest value on the backend's normalized pointing grid.
pub const COORDINATE_GRID_MAX: f64 = 999.0;

/// Text the coordinate call yields when no point is available.
pub const NO_COORDINATE: &str = "None";

/// A point on the 0..=999 grid, independent of image resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_negative(&self) -> bool {
        self.x < 0 || self.y < 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateParseError {
    #[error("backend returned no coordinate")]
    Missing,
    #[error("expected \"x,y\", got {0:?}")]
    Malformed(String),
}

impl FromStr for Coordinate {
    type Err = CoordinateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == NO_COORDINATE {
            return Err(CoordinateParseError::Missing);
        }

        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| CoordinateParseError::Malformed(s.to_string()))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| CoordinateParseError::Malformed(s.to_string()))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| CoordinateParseError::Malformed(s.to_string()))?;

        Ok(Self { x, y })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_request_skips_absent_fields() {
        let req = ActionRequest::new("open settings", "data:image/png;base64,AAAA")
            .with_os_name("macOS");
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["goal"], "open settings");
        assert_eq!(json["os_name"], "macOS");
        assert!(json.get("completed_steps").is_none());
        assert!(json.get("follow_up_context").is_none());
    }

    #[test]
    fn test_follow_up_context_field_names() {
        let req = ActionRequest::new("g", "img").with_follow_up(FollowUpContext {
            previous_image: "prev".to_string(),
            previous_instruction: "Click Save".to_string(),
            follow_up_message: "nothing happened".to_string(),
        });
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["follow_up_context"]["previous_instruction"], "Click Save");
        assert_eq!(json["follow_up_context"]["follow_up_message"], "nothing happened");
    }

    #[test]
    fn test_help_request_drops_empty_previous_message() {
        let req = HelpRequest::new("g", "img", "where?").with_previous_message("");
        assert!(req.previous_message.is_none());

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("previous_message").is_none());
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!("500,250".parse::<Coordinate>(), Ok(Coordinate::new(500, 250)));
        assert_eq!(" 12 , 7 \n".parse::<Coordinate>(), Ok(Coordinate::new(12, 7)));
        assert_eq!("None".parse::<Coordinate>(), Err(CoordinateParseError::Missing));
        assert!(matches!(
            "12".parse::<Coordinate>(),
            Err(CoordinateParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_context_file_size_and_mime() {
        let file = ContextFile::new("notes.txt", "", "hello".as_bytes().to_vec());
        assert_eq!(file.size().as_bytes(), 5);
        assert!(file.effective_mime_type().is_octet_stream());
    }
}

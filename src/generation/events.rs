use serde::Deserialize;

/// Prefix of every payload-bearing record.
pub const DATA_PREFIX: &str = "data: ";
/// Record marking the end of generation.
pub const DONE_SENTINEL: &str = "data: [DONE]";

/// One decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    Terminal,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WireEvent {
    TextDelta {
        delta: String,
    },
    #[serde(other)]
    Other,
}

/// Parse one newline-delimited record.
///
/// Empty lines, unprefixed lines and payloads of other kinds yield `None`.
/// Malformed JSON is logged and skipped.
pub fn parse_record(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == DONE_SENTINEL {
        return Some(StreamEvent::Terminal);
    }

    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<WireEvent>(payload) {
        Ok(WireEvent::TextDelta { delta }) => Some(StreamEvent::TextDelta(delta)),
        Ok(WireEvent::Other) => None,
        Err(e) => {
            log::warn!("Skipping malformed stream record: {} ({})", e, payload);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        assert_eq!(
            parse_record(r#"data: {"type":"text-delta","id":"0","delta":"Click "}"#),
            Some(StreamEvent::TextDelta("Click ".to_string()))
        );
    }

    #[test]
    fn test_terminal_and_blank() {
        assert_eq!(parse_record("data: [DONE]"), Some(StreamEvent::Terminal));
        assert_eq!(parse_record("  data: [DONE]\r"), Some(StreamEvent::Terminal));
        assert_eq!(parse_record(""), None);
        assert_eq!(parse_record("   "), None);
    }

    #[test]
    fn test_other_kinds_dropped() {
        assert_eq!(parse_record(r#"data: {"type":"start"}"#), None);
        assert_eq!(parse_record(r#"data: {"type":"finish","finishReason":"stop"}"#), None);
        assert_eq!(parse_record("event: ping"), None);
    }

    #[test]
    fn test_malformed_json_skipped() {
        assert_eq!(parse_record(r#"data: {"type":"text-delta","delta":"#), None);
        assert_eq!(parse_record(r#"data: {"type":"text-delta"}"#), None);
    }
}

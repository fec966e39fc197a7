//! Transcript line decoding
//!
//! Accepts both the flat `{role, content, timestamp}` record and the
//! envelope form `{type: "message", timestamp, message: {role, content}}`.
//! Content is either a plain string or a list of typed blocks; only `text`
//! blocks contribute text and tool-call blocks are kept for spawn detection.

use crate::source::parse_timestamp;
use crate::types::{Role, ToolCall, TranscriptEntry};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawLine {
    #[serde(rename = "type")]
    record_type: Option<String>,
    role: Option<String>,
    content: Option<RawContent>,
    timestamp: Option<serde_json::Value>,
    message: Option<RawMessage>,
    #[serde(alias = "errorMessage")]
    error_message: Option<String>,
    #[serde(alias = "stopReason")]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
    timestamp: Option<serde_json::Value>,
    #[serde(alias = "errorMessage")]
    error_message: Option<String>,
    #[serde(alias = "stopReason")]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use", alias = "toolCall", alias = "tool_call")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default, alias = "arguments")]
        input: serde_json::Value,
    },
    // Thinking, images, tool results and anything newer
    #[serde(other)]
    Unknown,
}

/// Decode one transcript line.
///
/// Returns `Ok(None)` for well-formed records that are not conversational
/// turns (session headers, model changes). Returns `Err` with a short
/// reason for malformed JSON or a missing/unparseable timestamp.
pub fn decode_line(line: &str) -> Result<Option<TranscriptEntry>, String> {
    let raw: RawLine = serde_json::from_str(line).map_err(|e| format!("JSON parse error: {}", e))?;

    let message = raw.message.unwrap_or_default();
    let role = match message.role.as_deref().or(raw.role.as_deref()) {
        Some(role) => Role::parse(role),
        None => return Ok(None),
    };
    if let Some(record_type) = raw.record_type.as_deref() {
        if record_type != "message" && raw.role.is_none() && message.content.is_none() {
            return Ok(None);
        }
    }

    let timestamp = raw
        .timestamp
        .as_ref()
        .or(message.timestamp.as_ref())
        .and_then(parse_timestamp)
        .ok_or_else(|| "missing or unparseable timestamp".to_string())?;

    let (text, tool_calls) = match message.content.or(raw.content) {
        Some(content) => flatten_content(content),
        None => (String::new(), Vec::new()),
    };

    let stop_reason = message.stop_reason.or(raw.stop_reason);
    let error = message
        .error_message
        .or(raw.error_message)
        .filter(|e| !e.trim().is_empty())
        .or_else(|| {
            (stop_reason.as_deref() == Some("error")).then(|| "stopped with error".to_string())
        });

    Ok(Some(TranscriptEntry {
        role,
        text,
        timestamp,
        tool_calls,
        error,
    }))
}

/// Join text blocks with newlines and collect tool calls.
fn flatten_content(content: RawContent) -> (String, Vec<ToolCall>) {
    match content {
        RawContent::Text(text) => (text, Vec::new()),
        RawContent::Blocks(blocks) => {
            let mut texts = Vec::new();
            let mut tools = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } if !text.trim().is_empty() => texts.push(text),
                    ContentBlock::ToolUse { name, input } => tools.push(ToolCall { name, input }),
                    _ => {}
                }
            }
            (texts.join("\n"), tools)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_flat_record() {
        let entry = decode_line(
            r#"{"role":"user","content":"hello there","timestamp":"2026-03-01T12:00:00Z"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.text, "hello there");
        assert!(entry.error.is_none());
    }

    #[test]
    fn test_decode_envelope_with_blocks() {
        let line = r#"{"type":"message","timestamp":"2026-03-01T12:00:05Z","message":{"role":"assistant","content":[
            {"type":"thinking","thinking":"hmm"},
            {"type":"text","text":"First part."},
            {"type":"toolCall","name":"sessions_spawn","arguments":{"label":"research"}},
            {"type":"text","text":"Second part."}
        ]}}"#;
        let entry = decode_line(line).unwrap().unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.text, "First part.\nSecond part.");
        assert_eq!(entry.tool_calls.len(), 1);
        assert_eq!(entry.tool_calls[0].name, "sessions_spawn");
        assert_eq!(entry.tool_calls[0].input["label"], "research");
    }

    #[test]
    fn test_decode_epoch_millis_timestamp() {
        let entry = decode_line(r#"{"role":"assistant","content":"ok","timestamp":1772366400000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.timestamp.timestamp(), 1_772_366_400);
    }

    #[test]
    fn test_decode_error_turn() {
        let entry = decode_line(
            r#"{"type":"message","timestamp":"2026-03-01T12:00:05Z","message":{"role":"assistant","content":[],"stopReason":"error","errorMessage":"rate limited"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(entry.error.as_deref(), Some("rate limited"));

        let entry = decode_line(
            r#"{"role":"assistant","content":"","stop_reason":"error","timestamp":"2026-03-01T12:00:05Z"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(entry.error.is_some());
    }

    #[test]
    fn test_non_message_records_are_skipped() {
        assert_eq!(
            decode_line(r#"{"type":"session","id":"abc","timestamp":"2026-03-01T12:00:00Z"}"#),
            Ok(None)
        );
        assert_eq!(
            decode_line(r#"{"type":"model_change","model":"opus"}"#),
            Ok(None)
        );
    }

    #[test]
    fn test_malformed_lines_are_errors() {
        assert!(decode_line("{not json").is_err());
        assert!(decode_line(r#"{"role":"user","content":"hi","timestamp":"soon"}"#).is_err());
        assert!(decode_line(r#"{"role":"user","content":"hi"}"#).is_err());
    }
}

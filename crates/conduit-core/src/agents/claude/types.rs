//! Claude-specific JSON types for stream decoding.
//!
//! Claude prints one JSON object per line. The envelope is always
//! discriminated by `type`; which other fields are present depends on it:
//!
//! ```json
//! {"type":"assistant","session_id":"sess-123","message":{"role":"assistant","content":[...]}}
//! ```
//!
//! becomes a [`ClaudeStreamEvent`] with `event_type = "assistant"` and
//! `message = Some(..)`.

use serde::Deserialize;

/// A Claude stream event.
///
/// Different event types populate different optional fields. Every optional
/// field uses `#[serde(default)]` so a missing key parses as `None` instead
/// of failing the whole line.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeStreamEvent {
    /// "system", "assistant", "user", "result", ...
    ///
    /// `type` is a Rust keyword, hence the rename.
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Set on messages produced by a subagent (Task tool).
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,

    #[serde(default)]
    pub message: Option<ClaudeMessage>,

    /// Final text, on "result".
    #[serde(default)]
    pub result: Option<String>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub num_turns: Option<u32>,
}

/// Assistant or user message with content blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: ClaudeContent,
}

/// User messages may carry a bare string instead of a block list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A content block: text, thinking, tool_use or tool_result.
///
/// All type-specific fields are optional so one struct covers every block.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    /// For "text" blocks.
    #[serde(default)]
    pub text: Option<String>,

    /// For "thinking" blocks.
    #[serde(default)]
    pub thinking: Option<String>,

    /// Tool use id, for "tool_use" blocks.
    #[serde(default)]
    pub id: Option<String>,

    /// Tool name, for "tool_use" blocks.
    #[serde(default)]
    pub name: Option<String>,

    /// Tool input, for "tool_use" blocks.
    #[serde(default)]
    pub input: Option<serde_json::Value>,

    /// For "tool_result" blocks.
    #[serde(default)]
    pub tool_use_id: Option<String>,

    /// For "tool_result" blocks: a string or a list of text blocks.
    #[serde(default)]
    pub content: Option<serde_json::Value>,

    #[serde(default)]
    pub is_error: bool,
}

impl ContentBlock {
    /// Flattened text of a tool_result's `content`.
    pub fn result_text(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

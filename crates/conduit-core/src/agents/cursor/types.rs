//! cursor-agent JSON types for stream decoding.
//!
//! Every line is an envelope discriminated by `type`:
//!
//! ```json
//! {"type":"system","subtype":"init","session_id":"s-1","model":"gpt-5","cwd":"/repo"}
//! {"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Looking"}]}}
//! {"type":"tool_call","subtype":"started","call_id":"c-1","tool_call":{"readToolCall":{"args":{"path":"a.rs"}}}}
//! {"type":"result","subtype":"success","is_error":false,"result":"Done.","duration_ms":1520}
//! ```
//!
//! Only the fields the decoder reads are modelled; everything is optional so
//! new fields or record types never break parsing.

use serde::Deserialize;

/// One cursor-agent output record.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorRecord {
    #[serde(rename = "type")]
    pub record_type: String,

    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,

    /// Model name, on `system/init`.
    #[serde(default)]
    pub model: Option<String>,

    /// On `user` and `assistant` records.
    #[serde(default)]
    pub message: Option<CursorMessage>,

    /// Correlates `tool_call` started/completed pairs.
    #[serde(default)]
    pub call_id: Option<String>,

    /// Family-specific tool payload, normalized by
    /// [`crate::agents::tool_call::normalize_cursor`].
    #[serde(default)]
    pub tool_call: Option<serde_json::Value>,

    /// Final text, on `result`.
    #[serde(default)]
    pub result: Option<String>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CursorMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: MessageContent,
}

/// Message content is usually a block list, occasionally a bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|block| block.block_type == "text")
                .filter_map(|block| block.text.as_deref())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

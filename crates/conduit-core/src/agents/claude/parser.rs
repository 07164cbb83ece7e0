//! Claude stream decoder.
//!
//! # How this decoder works
//!
//! 1. Each line is deserialized into a [`ClaudeStreamEvent`]
//! 2. `assistant` records are walked block by block: text extends the current
//!    turn, `tool_use` opens a tool call and remembers it by id
//! 3. `user` records carry `tool_result` blocks; each one is matched to the
//!    remembered call so the outcome can be normalized for the right kind
//! 4. `result` ends the run with Done or Error

use std::collections::HashMap;

use crate::agents::decoder::{AgentFamily, DecodeSkip, RecordDecoder};
use crate::agents::event::{EventKind, Role};
use crate::agents::tool_call::{claude_outcome, normalize_claude, NormalizedToolCall, ToolCall};

use super::types::{ClaudeContent, ClaudeStreamEvent, ContentBlock};

/// A tool_use we have seen but whose result has not arrived yet.
#[derive(Debug, Clone)]
enum PendingCall {
    Known(ToolCall),
    Unknown(String),
}

/// Decoder state for one Claude run.
#[derive(Debug, Default)]
pub struct ClaudeDecoder {
    session_id: Option<String>,
    turn_text: String,
    pending: HashMap<String, PendingCall>,
}

impl ClaudeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Number of tool calls still waiting for a result.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    fn translate(&mut self, event: ClaudeStreamEvent) -> Result<Vec<EventKind>, DecodeSkip> {
        match event.event_type.as_str() {
            "system" if event.subtype.as_deref() == Some("init") => {
                let message = match event.model {
                    Some(ref model) if !model.is_empty() => {
                        format!("Agent session started (model: {model})")
                    }
                    _ => "Agent session started".to_string(),
                };
                Ok(vec![EventKind::Start { message }])
            }

            "assistant" => {
                let Some(message) = event.message else {
                    return Err(DecodeSkip::Malformed("assistant without message".to_string()));
                };
                let events = match message.content {
                    ClaudeContent::Text(text) => self.assistant_text(&text).into_iter().collect(),
                    ClaudeContent::Blocks(blocks) => {
                        let mut events = Vec::new();
                        for block in &blocks {
                            events.extend(self.assistant_block(block));
                        }
                        events
                    }
                };
                non_empty(events, "assistant")
            }

            "user" => {
                let Some(message) = event.message else {
                    return Err(DecodeSkip::Malformed("user without message".to_string()));
                };
                let events = match message.content {
                    ClaudeContent::Text(text) if !text.trim().is_empty() => {
                        self.turn_text.clear();
                        vec![EventKind::Message {
                            role: Role::User,
                            text,
                        }]
                    }
                    ClaudeContent::Text(_) => Vec::new(),
                    ClaudeContent::Blocks(blocks) => blocks
                        .iter()
                        .filter(|block| block.block_type == "tool_result")
                        .filter_map(|block| self.tool_result(block))
                        .collect(),
                };
                non_empty(events, "user")
            }

            "result" => {
                let failed = event.is_error
                    || event.subtype.as_deref().is_some_and(|s| s != "success");
                if failed {
                    let message = event
                        .result
                        .filter(|r| !r.trim().is_empty())
                        .or_else(|| event.subtype.map(|s| format!("Agent stopped: {s}")))
                        .unwrap_or_else(|| "Agent reported an error".to_string());
                    return Ok(vec![EventKind::Error {
                        message,
                        exit_code: None,
                    }]);
                }
                let message = match (event.num_turns, event.duration_ms) {
                    (Some(turns), Some(ms)) => format!("Completed {turns} turns in {ms}ms"),
                    (None, Some(ms)) => format!("Completed in {ms}ms"),
                    _ => "Completed".to_string(),
                };
                let output = event
                    .result
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| self.turn_text.clone());
                Ok(vec![EventKind::Done { message, output }])
            }

            other => Err(DecodeSkip::Ignored(other.to_string())),
        }
    }

    fn assistant_text(&mut self, text: &str) -> Option<EventKind> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !self.turn_text.is_empty() {
            self.turn_text.push_str("\n\n");
        }
        self.turn_text.push_str(trimmed);
        Some(EventKind::Message {
            role: Role::Assistant,
            text: self.turn_text.clone(),
        })
    }

    fn assistant_block(&mut self, block: &ContentBlock) -> Option<EventKind> {
        match block.block_type.as_str() {
            "text" => self.assistant_text(block.text.as_deref().unwrap_or("")),

            "tool_use" => {
                let id = block.id.clone()?;
                let name = block.name.as_deref().unwrap_or("Unknown");
                let input = block.input.clone().unwrap_or(serde_json::Value::Null);
                self.turn_text.clear();

                match normalize_claude(name, &input) {
                    NormalizedToolCall::Known { call, .. } => {
                        self.pending.insert(id.clone(), PendingCall::Known(call.clone()));
                        Some(EventKind::ToolCallStarted {
                            call_id: id,
                            tool_call: call,
                        })
                    }
                    NormalizedToolCall::Unknown { name, args } => {
                        self.pending.insert(id, PendingCall::Unknown(name.clone()));
                        Some(EventKind::Message {
                            role: Role::Assistant,
                            text: NormalizedToolCall::unknown_display(&name, &args),
                        })
                    }
                }
            }

            // Thinking blocks are internal reasoning and are not surfaced.
            _ => None,
        }
    }

    fn tool_result(&mut self, block: &ContentBlock) -> Option<EventKind> {
        let id = block.tool_use_id.as_deref()?;
        let Some(pending) = self.pending.remove(id) else {
            log::debug!("tool_result for unknown tool_use id {}", id);
            return None;
        };

        let text = block.result_text();
        match pending {
            PendingCall::Known(call) => Some(EventKind::ToolCallCompleted {
                call_id: id.to_string(),
                outcome: claude_outcome(&call, &text, block.is_error),
                tool_call: call,
            }),
            PendingCall::Unknown(name) => Some(EventKind::Message {
                role: Role::Assistant,
                text: format!("[{name}] completed"),
            }),
        }
    }
}

fn non_empty(events: Vec<EventKind>, record: &str) -> Result<Vec<EventKind>, DecodeSkip> {
    if events.is_empty() {
        Err(DecodeSkip::Ignored(record.to_string()))
    } else {
        Ok(events)
    }
}

impl RecordDecoder for ClaudeDecoder {
    fn family(&self) -> AgentFamily {
        AgentFamily::Claude
    }

    fn decode_line(&mut self, line: &str) -> Result<Vec<EventKind>, DecodeSkip> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(DecodeSkip::Empty);
        }

        let event: ClaudeStreamEvent =
            serde_json::from_str(trimmed).map_err(|e| DecodeSkip::Malformed(e.to_string()))?;

        if self.session_id.is_none() {
            self.session_id = event.session_id.clone();
        }

        self.translate(event)
    }
}

//! cursor-agent record decoder.

use crate::agents::decoder::{AgentFamily, DecodeSkip, RecordDecoder};
use crate::agents::event::{EventKind, Role};
use crate::agents::tool_call::{normalize_cursor, NormalizedToolCall, ToolOutcome};

use super::types::CursorRecord;

/// Decoder state for one cursor-agent run.
///
/// cursor emits assistant text in segments between tool calls. The decoder
/// accumulates the segments of the current reasoning turn so each Message
/// event carries the whole turn so far; a tool call or user record closes
/// the turn.
#[derive(Debug, Default)]
pub struct CursorDecoder {
    session_id: Option<String>,
    turn_text: String,
}

impl CursorDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent-side session id, once `system/init` was seen.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn translate(&mut self, record: CursorRecord) -> Result<Vec<EventKind>, DecodeSkip> {
        match record.record_type.as_str() {
            "system" => {
                if record.subtype.as_deref() != Some("init") {
                    return Err(DecodeSkip::Ignored("system".to_string()));
                }
                let message = match record.model {
                    Some(ref model) if !model.is_empty() => {
                        format!("Agent session started (model: {model})")
                    }
                    _ => "Agent session started".to_string(),
                };
                Ok(vec![EventKind::Start { message }])
            }

            "user" => {
                let text = record
                    .message
                    .map(|m| m.content.text())
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(DecodeSkip::Ignored("empty user message".to_string()));
                }
                self.turn_text.clear();
                Ok(vec![EventKind::Message {
                    role: Role::User,
                    text,
                }])
            }

            "assistant" => {
                let text = record
                    .message
                    .map(|m| m.content.text())
                    .unwrap_or_default();
                if text.is_empty() {
                    return Err(DecodeSkip::Ignored("empty assistant message".to_string()));
                }
                self.turn_text.push_str(&text);
                Ok(vec![EventKind::Message {
                    role: Role::Assistant,
                    text: self.turn_text.clone(),
                }])
            }

            "tool_call" => self.translate_tool_call(record),

            "result" => {
                let failed = record.is_error || record.subtype.as_deref().is_some_and(|s| s != "success");
                if failed {
                    return Ok(vec![EventKind::Error {
                        message: record
                            .result
                            .filter(|r| !r.trim().is_empty())
                            .unwrap_or_else(|| "Agent reported an error".to_string()),
                        exit_code: None,
                    }]);
                }
                let message = match record.duration_ms {
                    Some(ms) => format!("Completed in {ms}ms"),
                    None => "Completed".to_string(),
                };
                let output = record
                    .result
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| self.turn_text.clone());
                Ok(vec![EventKind::Done { message, output }])
            }

            other => Err(DecodeSkip::Ignored(other.to_string())),
        }
    }

    fn translate_tool_call(&mut self, record: CursorRecord) -> Result<Vec<EventKind>, DecodeSkip> {
        let call_id = record
            .call_id
            .ok_or_else(|| DecodeSkip::Malformed("tool_call without call_id".to_string()))?;
        let payload = record
            .tool_call
            .ok_or_else(|| DecodeSkip::Malformed("tool_call without payload".to_string()))?;
        let completed = match record.subtype.as_deref() {
            Some("started") => false,
            Some("completed") => true,
            other => {
                return Err(DecodeSkip::Ignored(format!(
                    "tool_call/{}",
                    other.unwrap_or("none")
                )))
            }
        };

        self.turn_text.clear();

        let event = match normalize_cursor(&payload) {
            NormalizedToolCall::Known { call, outcome } if completed => {
                EventKind::ToolCallCompleted {
                    call_id,
                    tool_call: call,
                    outcome: outcome.unwrap_or_else(|| ToolOutcome::Failure {
                        message: "tool call completed without a result".to_string(),
                    }),
                }
            }
            NormalizedToolCall::Known { call, .. } => EventKind::ToolCallStarted {
                call_id,
                tool_call: call,
            },
            NormalizedToolCall::Unknown { name, args } => {
                let text = if completed {
                    format!("[{name}] completed")
                } else {
                    NormalizedToolCall::unknown_display(&name, &args)
                };
                log::debug!("Unrecognized cursor tool call {} ({})", name, call_id);
                EventKind::Message {
                    role: Role::Assistant,
                    text,
                }
            }
        };
        Ok(vec![event])
    }
}

impl RecordDecoder for CursorDecoder {
    fn family(&self) -> AgentFamily {
        AgentFamily::Cursor
    }

    fn decode_line(&mut self, line: &str) -> Result<Vec<EventKind>, DecodeSkip> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(DecodeSkip::Empty);
        }

        let record: CursorRecord =
            serde_json::from_str(trimmed).map_err(|e| DecodeSkip::Malformed(e.to_string()))?;

        if self.session_id.is_none() {
            self.session_id = record.session_id.clone();
        }

        self.translate(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tool_call::{ToolCall, ToolOutput};

    fn decode(decoder: &mut CursorDecoder, line: &str) -> Vec<EventKind> {
        decoder.decode_line(line).unwrap()
    }

    mod envelope {
        use super::*;

        #[test]
        fn init_becomes_start() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"system","subtype":"init","session_id":"s-1","model":"gpt-5"}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Start {
                    message: "Agent session started (model: gpt-5)".to_string()
                }]
            );
            assert_eq!(d.session_id(), Some("s-1"));
        }

        #[test]
        fn assistant_text_accumulates_within_turn() {
            let mut d = CursorDecoder::new();
            decode(
                &mut d,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Let me "}]}}"#,
            );
            let events = decode(
                &mut d,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"look."}]}}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Message {
                    role: Role::Assistant,
                    text: "Let me look.".to_string()
                }]
            );
        }

        #[test]
        fn tool_call_resets_turn_text() {
            let mut d = CursorDecoder::new();
            decode(
                &mut d,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"first"}]}}"#,
            );
            decode(
                &mut d,
                r#"{"type":"tool_call","subtype":"started","call_id":"c1","tool_call":{"readToolCall":{"args":{"path":"a"}}}}"#,
            );
            let events = decode(
                &mut d,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"second"}]}}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Message {
                    role: Role::Assistant,
                    text: "second".to_string()
                }]
            );
        }

        #[test]
        fn user_record_becomes_user_message() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"user","message":{"role":"user","content":[{"type":"text","text":"fix it"}]}}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Message {
                    role: Role::User,
                    text: "fix it".to_string()
                }]
            );
        }

        #[test]
        fn success_result_becomes_done() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"result","subtype":"success","is_error":false,"result":"All good","duration_ms":42}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Done {
                    message: "Completed in 42ms".to_string(),
                    output: "All good".to_string()
                }]
            );
        }

        #[test]
        fn empty_result_falls_back_to_turn_text() {
            let mut d = CursorDecoder::new();
            decode(
                &mut d,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"answer"}]}}"#,
            );
            let events = decode(&mut d, r#"{"type":"result","subtype":"success","result":""}"#);
            match &events[0] {
                EventKind::Done { output, .. } => assert_eq!(output, "answer"),
                other => panic!("Expected Done, got {:?}", other),
            }
        }

        #[test]
        fn error_result_becomes_error() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"result","subtype":"error","is_error":true,"result":"rate limited"}"#,
            );
            assert_eq!(
                events,
                vec![EventKind::Error {
                    message: "rate limited".to_string(),
                    exit_code: None
                }]
            );
        }
    }

    mod tool_calls {
        use super::*;

        #[test]
        fn started_and_completed_pair() {
            let mut d = CursorDecoder::new();
            let started = decode(
                &mut d,
                r#"{"type":"tool_call","subtype":"started","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"ls"}}}}"#,
            );
            assert_eq!(
                started,
                vec![EventKind::ToolCallStarted {
                    call_id: "c1".to_string(),
                    tool_call: ToolCall::Shell {
                        command: "ls".to_string()
                    }
                }]
            );

            let completed = decode(
                &mut d,
                r#"{"type":"tool_call","subtype":"completed","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"ls"},"result":{"success":{"exitCode":0,"stdout":"a.rs\n","stderr":""}}}}}"#,
            );
            assert_eq!(
                completed,
                vec![EventKind::ToolCallCompleted {
                    call_id: "c1".to_string(),
                    tool_call: ToolCall::Shell {
                        command: "ls".to_string()
                    },
                    outcome: ToolOutcome::Success {
                        output: ToolOutput::Shell {
                            exit_code: 0,
                            output: "a.rs\n".to_string()
                        }
                    }
                }]
            );
        }

        #[test]
        fn unknown_tool_passes_through_as_message() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"tool_call","subtype":"started","call_id":"c9","tool_call":{"mcpToolCall":{"args":{"tool":"search"}}}}"#,
            );
            match &events[0] {
                EventKind::Message { role, text } => {
                    assert_eq!(*role, Role::Assistant);
                    assert!(text.starts_with("[mcpToolCall]"));
                }
                other => panic!("Expected Message, got {:?}", other),
            }
        }

        #[test]
        fn completed_without_result_is_failure() {
            let mut d = CursorDecoder::new();
            let events = decode(
                &mut d,
                r#"{"type":"tool_call","subtype":"completed","call_id":"c1","tool_call":{"editToolCall":{"args":{"path":"a"}}}}"#,
            );
            match &events[0] {
                EventKind::ToolCallCompleted { outcome, .. } => assert!(!outcome.is_success()),
                other => panic!("Expected ToolCallCompleted, got {:?}", other),
            }
        }

        #[test]
        fn tool_call_without_id_is_malformed() {
            let mut d = CursorDecoder::new();
            let result = d.decode_line(
                r#"{"type":"tool_call","subtype":"started","tool_call":{"editToolCall":{"args":{"path":"a"}}}}"#,
            );
            assert!(matches!(result, Err(DecodeSkip::Malformed(_))));
        }
    }

    mod skips {
        use super::*;

        #[test]
        fn empty_line_is_skipped() {
            let mut d = CursorDecoder::new();
            assert_eq!(d.decode_line("   "), Err(DecodeSkip::Empty));
        }

        #[test]
        fn non_json_is_malformed() {
            let mut d = CursorDecoder::new();
            assert!(matches!(
                d.decode_line("not-json-at-all"),
                Err(DecodeSkip::Malformed(_))
            ));
        }

        #[test]
        fn unknown_type_is_ignored() {
            let mut d = CursorDecoder::new();
            assert_eq!(
                d.decode_line(r#"{"type":"thinking","subtype":"delta"}"#),
                Err(DecodeSkip::Ignored("thinking".to_string()))
            );
        }
    }
}

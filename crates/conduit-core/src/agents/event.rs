//! Normalized event model shared by every agent family.
//!
//! Decoders produce [`EventKind`] values; the owning Session stamps them with
//! its id and a timestamp to form a [`BridgeEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool_call::{ToolCall, ToolOutcome};
use crate::session::SessionId;

/// Who authored a [`EventKind::Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Agent-independent event payload.
///
/// The `type` tag and all field names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// The agent reported that it is up.
    Start { message: String },

    /// Coarse progress report.
    Step {
        phase: String,
        message: String,
        progress_percent: u8,
    },

    /// The agent began a side-effecting tool call.
    ToolCallStarted { call_id: String, tool_call: ToolCall },

    /// A tool call finished; `outcome` says whether it succeeded.
    ToolCallCompleted {
        call_id: String,
        tool_call: ToolCall,
        outcome: ToolOutcome,
    },

    /// Text for the current reasoning turn (accumulated, not a delta).
    Message { role: Role, text: String },

    /// Terminal: the run finished successfully.
    Done { message: String, output: String },

    /// Terminal: the run was cancelled.
    Aborted { message: String },

    /// Terminal: the run failed.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl EventKind {
    /// Done, Aborted and Error end a Session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Done { .. } | EventKind::Aborted { .. } | EventKind::Error { .. }
        )
    }

    /// Short tag used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Start { .. } => "start",
            EventKind::Step { .. } => "step",
            EventKind::ToolCallStarted { .. } => "toolCallStarted",
            EventKind::ToolCallCompleted { .. } => "toolCallCompleted",
            EventKind::Message { .. } => "message",
            EventKind::Done { .. } => "done",
            EventKind::Aborted { .. } => "aborted",
            EventKind::Error { .. } => "error",
        }
    }
}

/// An [`EventKind`] as recorded in a Session's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl BridgeEvent {
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tool_call::{ToolOutput, ToolOutcome};

    fn sid() -> SessionId {
        SessionId("sess-1".to_string())
    }

    mod json_format {
        use super::*;

        #[test]
        fn step_uses_camel_case_tag_and_fields() {
            let event = BridgeEvent::new(
                sid(),
                EventKind::Step {
                    phase: "understanding".to_string(),
                    message: "Reading the codebase".to_string(),
                    progress_percent: 6,
                },
            );
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], "step");
            assert_eq!(json["sessionId"], "sess-1");
            assert_eq!(json["progressPercent"], 6);
            assert!(json.get("timestamp").is_some());
        }

        #[test]
        fn tool_call_started_is_flattened_under_type() {
            let event = BridgeEvent::new(
                sid(),
                EventKind::ToolCallStarted {
                    call_id: "call-1".to_string(),
                    tool_call: ToolCall::Delete {
                        path: "old.txt".to_string(),
                    },
                },
            );
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], "toolCallStarted");
            assert_eq!(json["callId"], "call-1");
            assert_eq!(json["toolCall"]["toolKind"], "delete");
            assert_eq!(json["toolCall"]["path"], "old.txt");
        }

        #[test]
        fn error_without_exit_code_omits_field() {
            let kind = EventKind::Error {
                message: "boom".to_string(),
                exit_code: None,
            };
            let json = serde_json::to_string(&kind).unwrap();
            assert!(!json.contains("exitCode"));
        }

        #[test]
        fn message_role_is_lowercase() {
            let kind = EventKind::Message {
                role: Role::Assistant,
                text: "hi".to_string(),
            };
            let json = serde_json::to_value(&kind).unwrap();
            assert_eq!(json["role"], "assistant");
        }
    }

    mod roundtrip {
        use super::*;

        #[test]
        fn completed_event_roundtrip() {
            let event = BridgeEvent::new(
                sid(),
                EventKind::ToolCallCompleted {
                    call_id: "c".to_string(),
                    tool_call: ToolCall::Shell {
                        command: "ls".to_string(),
                    },
                    outcome: ToolOutcome::Success {
                        output: ToolOutput::Shell {
                            exit_code: 0,
                            output: "a\nb".to_string(),
                        },
                    },
                },
            );
            let json = serde_json::to_string(&event).unwrap();
            let parsed: BridgeEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, event);
        }

        #[test]
        fn done_event_roundtrip() {
            let event = BridgeEvent::new(
                sid(),
                EventKind::Done {
                    message: "Completed".to_string(),
                    output: "feat: add thing".to_string(),
                },
            );
            let json = serde_json::to_string(&event).unwrap();
            let parsed: BridgeEvent = serde_json::from_str(&json).unwrap();
            assert!(parsed.is_terminal());
            assert_eq!(parsed.kind, event.kind);
        }
    }

    mod terminal {
        use super::*;

        #[test]
        fn only_done_aborted_error_are_terminal() {
            assert!(EventKind::Done {
                message: String::new(),
                output: String::new()
            }
            .is_terminal());
            assert!(EventKind::Aborted {
                message: String::new()
            }
            .is_terminal());
            assert!(EventKind::Error {
                message: String::new(),
                exit_code: Some(1)
            }
            .is_terminal());
            assert!(!EventKind::Start {
                message: String::new()
            }
            .is_terminal());
            assert!(!EventKind::Message {
                role: Role::User,
                text: String::new()
            }
            .is_terminal());
        }
    }
}

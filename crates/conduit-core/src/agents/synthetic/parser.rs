//! Synthetic record decoder.

use serde::{Deserialize, Serialize};

use crate::agents::decoder::{AgentFamily, DecodeSkip, RecordDecoder};
use crate::agents::event::{EventKind, Role};

const KNOWN_TYPES: [&str; 5] = ["start", "step", "message", "done", "error"];

fn default_role() -> Role {
    Role::Assistant
}

/// One line of synthetic agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyntheticRecord {
    Start {
        #[serde(default)]
        message: String,
    },
    Step {
        phase: String,
        #[serde(default)]
        message: String,
        progress: u8,
    },
    Message {
        #[serde(default = "default_role")]
        role: Role,
        text: String,
    },
    Done {
        #[serde(default)]
        message: String,
        #[serde(default)]
        output: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

/// Stateless apart from clamping progress above 100.
#[derive(Debug, Default)]
pub struct SyntheticDecoder;

impl SyntheticDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordDecoder for SyntheticDecoder {
    fn family(&self) -> AgentFamily {
        AgentFamily::Synthetic
    }

    fn decode_line(&mut self, line: &str) -> Result<Vec<EventKind>, DecodeSkip> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(DecodeSkip::Empty);
        }

        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| DecodeSkip::Malformed(e.to_string()))?;
        let record_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| DecodeSkip::Malformed("record without type".to_string()))?
            .to_string();
        if !KNOWN_TYPES.contains(&record_type.as_str()) {
            return Err(DecodeSkip::Ignored(record_type));
        }

        let record: SyntheticRecord =
            serde_json::from_value(value).map_err(|e| DecodeSkip::Malformed(e.to_string()))?;

        let kind = match record {
            SyntheticRecord::Start { message } => EventKind::Start { message },
            SyntheticRecord::Step {
                phase,
                message,
                progress,
            } => EventKind::Step {
                phase,
                message,
                progress_percent: progress.min(100),
            },
            SyntheticRecord::Message { role, text } => EventKind::Message { role, text },
            SyntheticRecord::Done { message, output } => EventKind::Done { message, output },
            SyntheticRecord::Error { message, exit_code } => EventKind::Error { message, exit_code },
        };
        Ok(vec![kind])
    }
}

//! Record decoding: raw agent output lines to normalized events.
//!
//! # How decoding works
//!
//! Agents write one JSON record per line. Bytes arrive from the pipe in
//! arbitrary chunks, so a [`LineFramer`] first reassembles complete lines
//! (the same buffering trick the family parsers have always used: keep the
//! trailing partial line in the buffer until its newline shows up). Each
//! complete line then goes through the family's [`RecordDecoder`].
//!
//! A decoder never fails the stream. A line that does not parse, or parses
//! into something we do not care about, comes back as [`DecodeSkip`] and the
//! caller moves on to the next line.
//!
//! # Adding a family
//!
//! Add a variant to [`AgentFamily`], a module under `agents/` with a type
//! implementing [`RecordDecoder`], and one arm in [`AgentFamily::decoder`].
//! Nothing in the session or stream layers needs to change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::claude::ClaudeDecoder;
use super::cursor::CursorDecoder;
use super::event::EventKind;
use super::synthetic::SyntheticDecoder;

/// Longest line the framer will hold before giving up on it.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Why a line produced no events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeSkip {
    #[error("empty line")]
    Empty,

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("ignored record type: {0}")]
    Ignored(String),
}

/// Decoder for one agent family's output schema.
///
/// Implementations may keep state between lines (pending tool calls, the
/// current turn's text) but must not perform I/O.
pub trait RecordDecoder: Send {
    /// Family this decoder understands.
    fn family(&self) -> AgentFamily;

    /// Decode one complete stdout line (without its newline).
    fn decode_line(&mut self, line: &str) -> Result<Vec<EventKind>, DecodeSkip>;

    /// Decode one stderr line. Stderr carries log output only, so the default
    /// produces nothing; implementations must never return a terminal event.
    fn decode_stderr(&mut self, _line: &str) -> Vec<EventKind> {
        Vec::new()
    }
}

/// The agent CLIs the bridge knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentFamily {
    /// `cursor-agent --output-format stream-json`
    Cursor,
    /// `claude --output-format stream-json`
    Claude,
    /// Scripted backend emitting staged progress records.
    Synthetic,
}

impl AgentFamily {
    pub const ALL: [AgentFamily; 3] = [
        AgentFamily::Cursor,
        AgentFamily::Claude,
        AgentFamily::Synthetic,
    ];

    /// Fresh decoder for one run of this family.
    pub fn decoder(self) -> Box<dyn RecordDecoder> {
        match self {
            AgentFamily::Cursor => Box::new(CursorDecoder::new()),
            AgentFamily::Claude => Box::new(ClaudeDecoder::new()),
            AgentFamily::Synthetic => Box::new(SyntheticDecoder::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentFamily::Cursor => "cursor",
            AgentFamily::Claude => "claude",
            AgentFamily::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for AgentFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentFamily::ALL
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown agent family: {}", s))
    }
}

/// Reassembles newline-delimited lines from arbitrary byte chunks.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line: usize,
    /// Set after an overlong line was dropped; cleared at the next newline.
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feed a chunk and return every line it completed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = data;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            let line = std::mem::take(&mut self.buffer);
            lines.push(to_line(&line));
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_line {
                log::warn!(
                    "Dropping agent output line longer than {} bytes",
                    self.max_line
                );
                self.buffer.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Take the trailing partial line left when the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        let remaining = std::mem::take(&mut self.buffer);
        let discarding = std::mem::replace(&mut self.discarding, false);
        if discarding || remaining.is_empty() {
            None
        } else {
            Some(to_line(&remaining))
        }
    }
}

fn to_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

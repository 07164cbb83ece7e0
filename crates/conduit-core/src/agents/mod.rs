//! Agent families and the normalized event model.
//!
//! Each family lives in its own module with a decoder for its output schema
//! and a spawn config that builds its command line. [`decoder::AgentFamily`]
//! ties them together.

pub mod claude;
pub mod cursor;
pub mod decoder;
pub mod event;
pub mod synthetic;
pub mod tool_call;

pub use decoder::{AgentFamily, DecodeSkip, LineFramer, RecordDecoder};
pub use event::{BridgeEvent, EventKind, Role};
pub use tool_call::{NormalizedToolCall, TodoItem, TodoStatus, ToolCall, ToolKind, ToolOutcome, ToolOutput};

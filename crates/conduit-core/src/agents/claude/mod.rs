//! Claude stream-json decoder and spawn configuration.
//!
//! Decodes Claude's `--output-format stream-json` records into normalized events.

mod parser;
pub mod spawn;
mod types;

pub use parser::ClaudeDecoder;
pub use spawn::ClaudeConfig;
pub use types::*;

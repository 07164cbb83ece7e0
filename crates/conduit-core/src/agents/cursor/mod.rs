//! cursor-agent stream-json decoder and spawn configuration.

mod parser;
pub mod spawn;
mod types;

pub use parser::CursorDecoder;
pub use spawn::CursorConfig;
pub use types::*;

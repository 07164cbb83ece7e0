//! Scripted agent family.
//!
//! The synthetic backend reports staged progress instead of real work:
//! a start record, a run of step records moving through phases, and a done
//! record. It exercises the whole bridge without an external agent installed.

mod parser;
mod plan;
pub mod spawn;

pub use parser::{SyntheticDecoder, SyntheticRecord};
pub use plan::{render_run, StepPlan};
pub use spawn::SyntheticConfig;

//! Driver adapters: one-shot agent runs for a specific task.
//!
//! A driver builds the prompt, runs a Session to its terminal event and
//! turns that event into a plain result.

pub mod commit_message;

pub use commit_message::{
    clean_commit_message, CommitMessageDriver, DriverError, GitStagedDiff, StagedContent,
};

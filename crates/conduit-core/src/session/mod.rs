//! Session management for agent runs.
//!
//! A Session binds one agent process and one decoder pipeline to an
//! append-only event log. The [`SessionManager`] registry is shared by every
//! interface (HTTP handlers, the CLI, drivers).

mod manager;
mod state;
mod supervisor;

pub use manager::{Admission, Invocation, SessionError, SessionManager, SessionPolicy};
pub use state::{Session, SessionId, SessionState, SessionSummary};

//! # conduit-core
//!
//! The agent process bridge behind Conduit.
//!
//! This crate is framework-agnostic and is used by:
//! - the HTTP server (`conduit-http`, REST + Server-Sent Events)
//! - the daemon CLI (`conduit-daemon run`, frames written to stdout)
//! - driver adapters such as commit-message generation
//!
//! ## Key Concepts
//!
//! - **Session**: one agent process run plus its append-only event log
//! - **BridgeEvent**: the normalized event every agent family decodes into
//! - **Subscription**: a replayable cursor over a Session's log

pub mod agents;
pub mod config;
pub mod drivers;
pub mod logging;
pub mod paths;
pub mod session;
pub mod shell;
pub mod spawn;
pub mod stream;

// Re-export commonly used types
pub use agents::{AgentFamily, BridgeEvent, EventKind};
pub use config::{AgentRequest, BridgeConfig};
pub use session::{Invocation, Session, SessionId, SessionManager};
pub use stream::{EmitOutcome, StreamEmitter, Subscription, Transport};

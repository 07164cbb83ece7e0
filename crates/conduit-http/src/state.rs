//! Shared state for the HTTP server.

use std::sync::Arc;

use conduit_core::{BridgeConfig, SessionManager, StreamEmitter};

/// State shared by every request handler.
pub struct SharedState {
    pub manager: Arc<SessionManager>,
    pub config: Arc<BridgeConfig>,
    pub emitter: StreamEmitter,
}

impl SharedState {
    /// Build a fresh registry governed by `config`.
    pub fn new(config: BridgeConfig) -> Self {
        let manager = Arc::new(SessionManager::new(config.session_policy()));
        Self::with_manager(manager, config)
    }

    /// Serve an existing registry, e.g. one the daemon also aborts on shutdown.
    pub fn with_manager(manager: Arc<SessionManager>, config: BridgeConfig) -> Self {
        let emitter = StreamEmitter::new(config.abort_on_disconnect);
        Self {
            manager,
            config: Arc::new(config),
            emitter,
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

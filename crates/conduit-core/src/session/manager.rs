//! SessionManager - the registry every interface shares.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{AgentFamily, BridgeEvent};
use crate::logging;
use crate::spawn::{AgentProcess, SpawnConfig, SpawnError};
use crate::stream::Subscription;

use super::state::{Session, SessionId, SessionSummary};
use super::supervisor;

const SETTLE_POLL: Duration = Duration::from_millis(25);

/// What to run: the decoder family plus the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub family: AgentFamily,
    pub spawn: SpawnConfig,
}

impl Invocation {
    pub fn new(family: AgentFamily, spawn: SpawnConfig) -> Self {
        Self { family, spawn }
    }
}

/// How new Sessions are admitted alongside live ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Any number of live Sessions.
    #[default]
    Concurrent,
    /// Abort every live Session before admitting a new one.
    SingleFlight,
}

/// Registry policy knobs.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub admission: Admission,
    /// Ended Sessions older than this are evicted on the next create.
    pub retention: Duration,
    /// Upper bound on registered Sessions; only ended ones are evicted. 0 disables.
    pub max_sessions: usize,
    /// Where per-session transcripts go, if anywhere.
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            admission: Admission::Concurrent,
            retention: Duration::from_secs(60 * 60),
            max_sessions: 100,
            log_dir: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Failed to spawn agent: {0}")]
    Spawn(#[from] SpawnError),
}

/// Registry of Sessions, keyed by id.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the agent and register a running Session.
    ///
    /// Must be called from within a Tokio runtime. A spawn failure is
    /// returned here and nothing is registered.
    pub fn create_session(&self, invocation: Invocation) -> Result<Arc<Session>, SessionError> {
        self.evict();

        if self.policy.admission == Admission::SingleFlight {
            let aborted = self.abort_all();
            if aborted > 0 {
                log::info!("Single-flight admission aborted {aborted} live session(s)");
            }
        }

        let id = SessionId::new();
        let family = invocation.family;
        let working_dir = invocation.spawn.working_dir.clone();
        let command = invocation.spawn.display();

        let (process, output) = AgentProcess::spawn(invocation.spawn).map_err(|e| {
            log::warn!("Failed to start {family} agent: {e}");
            e
        })?;

        let transcript = logging::open_log_file(self.policy.log_dir.as_deref(), &id.0);
        logging::log_line(&transcript, "COMMAND", &command);

        let session = Arc::new(Session::new(id.clone(), family, working_dir, transcript));
        session.mark_running();
        self.registry().insert(id.clone(), Arc::clone(&session));

        supervisor::launch(Arc::clone(&session), process, output, family.decoder());
        log::info!("[{id}] started {family} session");
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get_session(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        self.registry().get(session_id).cloned()
    }

    fn require(&self, session_id: &SessionId) -> Result<Arc<Session>, SessionError> {
        self.get_session(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))
    }

    /// Abort a session. `Ok(false)` means it had already ended or been aborted.
    pub fn abort(&self, session_id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.require(session_id)?.abort())
    }

    /// Ordered snapshot of the log from `offset` on.
    pub fn get_events(
        &self,
        session_id: &SessionId,
        offset: usize,
    ) -> Result<Vec<BridgeEvent>, SessionError> {
        Ok(self.require(session_id)?.events_since(offset))
    }

    /// Live cursor over the log from `offset` on.
    pub fn subscribe(
        &self,
        session_id: &SessionId,
        offset: usize,
    ) -> Result<Subscription, SessionError> {
        Ok(self.require(session_id)?.subscribe(offset))
    }

    /// Summaries of every registered session, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Session>> = self.registry().values().cloned().collect();
        let mut summaries: Vec<SessionSummary> = sessions.iter().map(|s| s.summary()).collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Remove a session entirely, aborting it first if it is still live.
    pub fn remove_session(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        let session = self.registry().remove(session_id)?;
        session.abort();
        session.request_stop();
        Some(session)
    }

    /// Abort every live session. Returns how many were aborted.
    pub fn abort_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.registry().values().cloned().collect();
        sessions.iter().filter(|s| s.abort()).count()
    }

    /// Abort every live session, stop any process still lingering, then wait
    /// up to `timeout` for the agent processes to be reaped. Returns how many
    /// sessions were aborted.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let aborted = self.abort_all();
        let sessions: Vec<Arc<Session>> = self.registry().values().cloned().collect();
        // Ended sessions can still have a process lingering after its result.
        for session in &sessions {
            session.request_stop();
        }

        let settled = async {
            for session in &sessions {
                while !session.is_settled() {
                    tokio::time::sleep(SETTLE_POLL).await;
                }
            }
        };
        if tokio::time::timeout(timeout, settled).await.is_err() {
            log::warn!("Agent processes still running after {:?}", timeout);
        }
        aborted
    }

    /// Drop ended sessions past retention, then the oldest ended ones while
    /// over capacity.
    fn evict(&self) {
        let now = Utc::now();
        let mut registry = self.registry();

        let mut ended: Vec<(chrono::DateTime<Utc>, SessionId)> = registry
            .values()
            .filter_map(|s| s.ended_at().map(|at| (at, s.id.clone())))
            .collect();
        ended.sort_by_key(|(at, _)| *at);

        let mut removed = 0;
        for (ended_at, id) in &ended {
            let expired = (now - *ended_at)
                .to_std()
                .is_ok_and(|age| age > self.policy.retention);
            let over_capacity =
                self.policy.max_sessions > 0 && registry.len() >= self.policy.max_sessions;
            if expired || over_capacity {
                if let Some(session) = registry.remove(id) {
                    session.request_stop();
                }
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("Evicted {removed} ended session(s)");
        }
    }
}

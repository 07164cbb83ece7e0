//! Per-session state and the append-only event log.
//!
//! Everything that decides what lands in the log goes through one
//! `std::sync::Mutex`: the terminal check, the abort flag, progress clamping
//! and the push itself. That single critical section is what keeps exactly
//! one terminal event at the end of every log, whichever of the decoder, the
//! exit handler or `abort` gets there first.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::agents::{AgentFamily, BridgeEvent, EventKind, Role};
use crate::logging::{log_line, LogHandle};
use crate::shell::AgentExit;
use crate::spawn::ProcessError;
use crate::stream::Subscription;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Running,
    Done,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Aborted | SessionState::Failed
        )
    }

    fn after(kind: &EventKind) -> Option<SessionState> {
        match kind {
            EventKind::Done { .. } => Some(SessionState::Done),
            EventKind::Aborted { .. } => Some(SessionState::Aborted),
            EventKind::Error { .. } => Some(SessionState::Failed),
            _ => None,
        }
    }
}

/// Point-in-time view of a Session for listings and status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub family: AgentFamily,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    pub event_count: usize,
    pub skipped_lines: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<AgentExit>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    events: Vec<BridgeEvent>,
    aborted: bool,
    last_progress: Option<u8>,
    last_assistant_text: Option<String>,
    skipped_lines: u64,
    exit: Option<AgentExit>,
    ended_at: Option<DateTime<Utc>>,
    /// The supervisor has applied the process exit.
    settled: bool,
    /// The process must go even though the log is already closed.
    stop_requested: bool,
}

/// One agent run and its normalized event log.
///
/// The process handle is not stored here; it belongs to the supervisor task,
/// which learns about abort requests through [`Session::cancelled`].
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub family: AgentFamily,
    pub working_dir: Option<String>,
    pub created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    /// Log length, published after every append.
    len_tx: watch::Sender<usize>,
    cancel: Notify,
    transcript: LogHandle,
}

impl Session {
    pub fn new(
        id: SessionId,
        family: AgentFamily,
        working_dir: Option<String>,
        transcript: LogHandle,
    ) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            id,
            family,
            working_dir,
            created_at: Utc::now(),
            inner: Mutex::new(Inner {
                state: SessionState::Pending,
                events: Vec::new(),
                aborted: false,
                last_progress: None,
                last_assistant_text: None,
                skipped_lines: 0,
                exit: None,
                ended_at: None,
                settled: false,
                stop_requested: false,
            }),
            len_tx,
            cancel: Notify::new(),
            transcript,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pending → Running once the process is confirmed spawned.
    pub(crate) fn mark_running(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Pending {
            inner.state = SessionState::Running;
        }
    }

    /// Append a decoded event. Returns false if the log is already closed.
    ///
    /// A Step reporting less progress than an earlier Step is raised to the
    /// earlier value.
    pub fn append(&self, kind: EventKind) -> bool {
        let event = {
            let mut inner = self.lock();
            match self.push_locked(&mut inner, kind) {
                Some(event) => event,
                None => return false,
            }
        };
        self.transcribe(&event);
        true
    }

    fn push_locked(&self, inner: &mut Inner, mut kind: EventKind) -> Option<BridgeEvent> {
        if inner.state.is_terminal() {
            log::debug!(
                "[{}] dropping {} after terminal event",
                self.id,
                kind.label()
            );
            return None;
        }

        match kind {
            EventKind::Step {
                ref mut progress_percent,
                ..
            } => {
                let floor = inner.last_progress.unwrap_or(0);
                *progress_percent = (*progress_percent).clamp(floor, 100);
                inner.last_progress = Some(*progress_percent);
            }
            EventKind::Message {
                role: Role::Assistant,
                ref text,
            } => {
                inner.last_assistant_text = Some(text.clone());
            }
            _ => {}
        }

        if let Some(next) = SessionState::after(&kind) {
            inner.state = next;
            inner.ended_at = Some(Utc::now());
        } else if inner.state == SessionState::Pending {
            inner.state = SessionState::Running;
        }

        let event = BridgeEvent::new(self.id.clone(), kind);
        inner.events.push(event.clone());
        self.len_tx.send_replace(inner.events.len());
        Some(event)
    }

    fn transcribe(&self, event: &BridgeEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            log_line(&self.transcript, "EVENT", &json);
        }
    }

    /// Raw output line for the transcript file.
    pub(crate) fn transcript_line(&self, direction: &str, line: &str) {
        log_line(&self.transcript, direction, line);
    }

    /// Request cancellation.
    ///
    /// Appends the Aborted event and wakes the supervisor. Returns false when
    /// the Session already ended or was already aborted; calling it again is
    /// harmless.
    pub fn abort(&self) -> bool {
        let event = {
            let mut inner = self.lock();
            if inner.aborted || inner.state.is_terminal() {
                return false;
            }
            inner.aborted = true;
            self.push_locked(
                &mut inner,
                EventKind::Aborted {
                    message: "Aborted by user".to_string(),
                },
            )
        };

        if let Some(event) = event {
            self.transcribe(&event);
        }
        log::info!("[{}] abort requested", self.id);
        self.cancel.notify_one();
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Ask the supervisor to terminate the process whatever the log says.
    ///
    /// Used when the Session leaves the registry or the bridge shuts down;
    /// the log is not touched.
    pub(crate) fn request_stop(&self) {
        {
            let mut inner = self.lock();
            if inner.settled {
                return;
            }
            inner.stop_requested = true;
        }
        self.cancel.notify_one();
    }

    /// Resolves once `abort` or `request_stop` has been called.
    pub(crate) async fn cancelled(&self) {
        {
            let inner = self.lock();
            if inner.aborted || inner.stop_requested {
                return;
            }
        }
        self.cancel.notified().await;
    }

    pub(crate) fn record_skip(&self) {
        self.lock().skipped_lines += 1;
    }

    /// Apply the process exit to the log.
    ///
    /// If no terminal event landed yet, a clean exit becomes Done carrying
    /// the last assistant text and anything else becomes Error. Otherwise
    /// the exit is only recorded.
    pub(crate) fn finish(&self, exit: Result<AgentExit, ProcessError>) {
        let event = {
            let mut inner = self.lock();
            inner.settled = true;
            if let Ok(status) = &exit {
                inner.exit = Some(*status);
            }

            if inner.state.is_terminal() {
                match &exit {
                    Ok(status) if !status.success() && inner.state == SessionState::Done => {
                        log::warn!(
                            "[{}] agent reported success but exited with {}",
                            self.id,
                            status.describe()
                        );
                    }
                    Ok(status) => {
                        log::debug!("[{}] agent exited with {}", self.id, status.describe())
                    }
                    Err(e) => log::warn!("[{}] {}", self.id, e),
                }
                return;
            }

            let kind = match exit {
                Ok(status) if status.success() => EventKind::Done {
                    message: "Agent exited without a final result".to_string(),
                    output: inner.last_assistant_text.clone().unwrap_or_default(),
                },
                Ok(status) => EventKind::Error {
                    message: format!("Agent process exited with {}", status.describe()),
                    exit_code: status.code,
                },
                Err(e) => EventKind::Error {
                    message: e.to_string(),
                    exit_code: None,
                },
            };
            self.push_locked(&mut inner, kind)
        };

        if let Some(event) = event {
            log::info!("[{}] finished: {}", self.id, event.kind.label());
            self.transcribe(&event);
        }
    }

    /// Whether the agent process has been reaped and its exit applied.
    pub fn is_settled(&self) -> bool {
        self.lock().settled
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the log from `offset` on.
    pub fn events_since(&self, offset: usize) -> Vec<BridgeEvent> {
        self.lock().events.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn terminal_event(&self) -> Option<BridgeEvent> {
        self.lock()
            .events
            .last()
            .filter(|event| event.is_terminal())
            .cloned()
    }

    pub fn last_assistant_text(&self) -> Option<String> {
        self.lock().last_assistant_text.clone()
    }

    pub fn exit(&self) -> Option<AgentExit> {
        self.lock().exit
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.lock().ended_at
    }

    pub(crate) fn watch_len(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }

    /// Ordered event sequence starting at `offset`, ending after the
    /// terminal event.
    pub fn subscribe(self: &Arc<Self>, offset: usize) -> Subscription {
        Subscription::new(Arc::clone(self), offset)
    }

    /// Wait until the log is closed and return its terminal event.
    pub async fn wait_terminal(&self) -> BridgeEvent {
        let mut len_rx = self.len_tx.subscribe();
        loop {
            if let Some(event) = self.terminal_event() {
                return event;
            }
            // The sender lives in `self`, so this cannot fail while we wait.
            let _ = len_rx.changed().await;
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let inner = self.lock();
        SessionSummary {
            id: self.id.clone(),
            family: self.family,
            state: inner.state,
            created_at: self.created_at,
            ended_at: inner.ended_at,
            working_dir: self.working_dir.clone(),
            event_count: inner.events.len(),
            skipped_lines: inner.skipped_lines,
            exit: inner.exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::from("test-session"),
            AgentFamily::Synthetic,
            None,
            logging::disabled(),
        ))
    }

    fn step(progress: u8) -> EventKind {
        EventKind::Step {
            phase: "implementing".to_string(),
            message: "working".to_string(),
            progress_percent: progress,
        }
    }

    fn done(output: &str) -> EventKind {
        EventKind::Done {
            message: "ok".to_string(),
            output: output.to_string(),
        }
    }

    fn exit(code: i32) -> Result<AgentExit, ProcessError> {
        Ok(AgentExit {
            code: Some(code),
            signal: None,
        })
    }

    mod session_id {
        use super::*;

        #[test]
        fn new_generates_unique_ids() {
            assert_ne!(SessionId::new(), SessionId::new());
        }

        #[test]
        fn display_shows_inner_string() {
            let id = SessionId("test-session-123".to_string());
            assert_eq!(format!("{}", id), "test-session-123");
        }

        #[test]
        fn serializes_as_plain_string() {
            let id = SessionId("abc".to_string());
            assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        }
    }

    mod append {
        use super::*;

        #[test]
        fn first_event_moves_pending_to_running() {
            let s = session();
            assert_eq!(s.state(), SessionState::Pending);
            s.append(EventKind::Start {
                message: "up".to_string(),
            });
            assert_eq!(s.state(), SessionState::Running);
        }

        #[test]
        fn nothing_lands_after_terminal() {
            let s = session();
            assert!(s.append(step(10)));
            assert!(s.append(done("out")));
            assert!(!s.append(step(20)));
            assert!(!s.append(EventKind::Error {
                message: "late".to_string(),
                exit_code: None
            }));

            assert_eq!(s.len(), 2);
            assert_eq!(s.state(), SessionState::Done);
            assert!(s.terminal_event().is_some());
        }

        #[test]
        fn progress_never_decreases() {
            let s = session();
            for p in [10, 40, 20, 40, 90, 5, 100] {
                s.append(step(p));
            }
            let progress: Vec<u8> = s
                .events_since(0)
                .into_iter()
                .filter_map(|e| match e.kind {
                    EventKind::Step {
                        progress_percent, ..
                    } => Some(progress_percent),
                    _ => None,
                })
                .collect();
            assert_eq!(progress, vec![10, 40, 40, 40, 90, 90, 100]);
        }

        #[test]
        fn events_since_clamps_offset() {
            let s = session();
            s.append(step(1));
            s.append(step(2));
            assert_eq!(s.events_since(1).len(), 1);
            assert!(s.events_since(2).is_empty());
            assert!(s.events_since(50).is_empty());
        }

        #[test]
        fn events_carry_session_id() {
            let s = session();
            s.append(step(1));
            assert_eq!(s.events_since(0)[0].session_id, s.id);
        }
    }

    mod abort {
        use super::*;

        #[test]
        fn abort_twice_yields_one_aborted_event() {
            let s = session();
            s.mark_running();
            assert!(s.abort());
            assert!(!s.abort());

            let aborted = s
                .events_since(0)
                .iter()
                .filter(|e| matches!(e.kind, EventKind::Aborted { .. }))
                .count();
            assert_eq!(aborted, 1);
            assert_eq!(s.state(), SessionState::Aborted);
            assert!(s.is_aborted());
        }

        #[test]
        fn abort_after_done_is_noop() {
            let s = session();
            s.append(done("x"));
            assert!(!s.abort());
            assert_eq!(s.len(), 1);
            assert_eq!(s.state(), SessionState::Done);
        }

        #[tokio::test]
        async fn stop_request_wakes_supervisor_of_closed_log() {
            let s = session();
            s.append(done("x"));
            s.request_stop();

            tokio::time::timeout(std::time::Duration::from_secs(1), s.cancelled())
                .await
                .unwrap();
            assert_eq!(s.len(), 1);
            assert_eq!(s.state(), SessionState::Done);
        }

        #[test]
        fn decoder_events_after_abort_are_dropped() {
            let s = session();
            s.append(step(10));
            s.abort();
            assert!(!s.append(done("late")));
            let last = s.events_since(0).pop().unwrap();
            assert!(matches!(last.kind, EventKind::Aborted { .. }));
        }

        #[tokio::test]
        async fn cancelled_resolves_after_abort() {
            let s = session();
            let waiter = {
                let s = Arc::clone(&s);
                tokio::spawn(async move { s.cancelled().await })
            };
            s.abort();
            tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }

        #[tokio::test]
        async fn concurrent_aborts_append_once() {
            let s = session();
            s.mark_running();
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let s = Arc::clone(&s);
                    tokio::spawn(async move { s.abort() })
                })
                .collect();
            let mut wins = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1);
            assert_eq!(s.len(), 1);
        }
    }

    mod finish {
        use super::*;

        #[test]
        fn clean_exit_without_terminal_is_done_with_last_text() {
            let s = session();
            s.append(EventKind::Message {
                role: Role::Assistant,
                text: "feat: add parser".to_string(),
            });
            s.finish(exit(0));

            match s.terminal_event().map(|e| e.kind) {
                Some(EventKind::Done { output, .. }) => assert_eq!(output, "feat: add parser"),
                other => panic!("Expected Done, got {:?}", other),
            }
            assert_eq!(s.exit().and_then(|e| e.code), Some(0));
        }

        #[test]
        fn nonzero_exit_without_terminal_is_error_with_code() {
            let s = session();
            s.append(step(50));
            s.finish(exit(2));

            match s.terminal_event().map(|e| e.kind) {
                Some(EventKind::Error { exit_code, .. }) => assert_eq!(exit_code, Some(2)),
                other => panic!("Expected Error, got {:?}", other),
            }
            assert_eq!(s.state(), SessionState::Failed);
        }

        #[test]
        fn signalled_exit_is_error_without_code() {
            let s = session();
            s.finish(Ok(AgentExit {
                code: None,
                signal: Some(9),
            }));
            match s.terminal_event().map(|e| e.kind) {
                Some(EventKind::Error { exit_code, message }) => {
                    assert_eq!(exit_code, None);
                    assert!(message.contains("signal 9"));
                }
                other => panic!("Expected Error, got {:?}", other),
            }
        }

        #[test]
        fn decoder_done_wins_over_nonzero_exit() {
            let s = session();
            s.append(done("result"));
            s.finish(exit(1));

            assert_eq!(s.len(), 1);
            assert_eq!(s.state(), SessionState::Done);
            assert_eq!(s.exit().and_then(|e| e.code), Some(1));
        }

        #[test]
        fn exit_after_abort_adds_nothing() {
            let s = session();
            s.abort();
            s.finish(exit(130));
            assert_eq!(s.len(), 1);
            assert_eq!(s.state(), SessionState::Aborted);
        }
    }

    mod waiting {
        use super::*;

        #[tokio::test]
        async fn wait_terminal_returns_once_closed() {
            let s = session();
            let waiter = {
                let s = Arc::clone(&s);
                tokio::spawn(async move { s.wait_terminal().await })
            };
            s.append(step(10));
            s.append(done("final"));

            let event = waiter.await.unwrap();
            assert!(matches!(event.kind, EventKind::Done { .. }));
        }

        #[test]
        fn summary_reflects_state() {
            let s = session();
            s.append(step(10));
            s.record_skip();
            s.record_skip();
            let summary = s.summary();
            assert_eq!(summary.event_count, 1);
            assert_eq!(summary.skipped_lines, 2);
            assert_eq!(summary.state, SessionState::Running);

            let json = serde_json::to_value(&summary).unwrap();
            assert_eq!(json["family"], "synthetic");
            assert_eq!(json["skippedLines"], 2);
            assert!(json.get("endedAt").is_none());
        }
    }
}

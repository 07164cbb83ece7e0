//! Drain and supervisor tasks for one Session.
//!
//! Per Session there is one supervisor task, which owns the [`AgentProcess`],
//! and two drain tasks, one per pipe. The drains share the family decoder.
//! The supervisor waits for exit or an abort request, then gives the drains
//! a bounded time to flush whatever the process wrote last before applying
//! the exit status. A process still running once its log is closed gets the
//! kill grace to exit and is then terminated.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::agents::{DecodeSkip, EventKind, LineFramer, RecordDecoder};
use crate::shell::AgentExit;
use crate::spawn::{AgentProcess, ProcessError, ProcessOutput};

use super::state::Session;

/// How long drains may keep reading after the process exited.
///
/// A grandchild that inherited the pipes can hold them open past the exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 16 * 1024;

type SharedDecoder = Arc<Mutex<Box<dyn RecordDecoder>>>;

/// Start the drains and the supervisor for a freshly spawned process.
pub(crate) fn launch(
    session: Arc<Session>,
    process: AgentProcess,
    output: ProcessOutput,
    decoder: Box<dyn RecordDecoder>,
) -> JoinHandle<()> {
    let decoder: SharedDecoder = Arc::new(Mutex::new(decoder));

    let stdout = tokio::spawn(drain_stdout(
        Arc::clone(&session),
        Arc::clone(&decoder),
        output.stdout,
    ));
    let stderr = tokio::spawn(drain_stderr(
        Arc::clone(&session),
        Arc::clone(&decoder),
        output.stderr,
    ));

    tokio::spawn(supervise(session, process, vec![stdout, stderr]))
}

enum Wake {
    Exited(Result<AgentExit, ProcessError>),
    Cancelled,
    LogClosed,
}

async fn supervise(session: Arc<Session>, mut process: AgentProcess, mut drains: Vec<JoinHandle<()>>) {
    let grace = process.kill_grace();
    let wake = tokio::select! {
        result = process.wait() => Wake::Exited(result),
        _ = session.cancelled() => Wake::Cancelled,
        _ = session.wait_terminal() => Wake::LogClosed,
    };

    let exit = match wake {
        Wake::Exited(result) => result,
        Wake::Cancelled => {
            log::info!("[{}] terminating agent process", session.id);
            process.terminate(grace).await
        }
        // The agent reported its result (or its output broke) but is still
        // running. Give it the grace period to exit on its own.
        Wake::LogClosed => {
            let lingered = tokio::select! {
                result = tokio::time::timeout(grace, process.wait()) => result.ok(),
                _ = session.cancelled() => None,
            };
            match lingered {
                Some(result) => result,
                None => {
                    log::info!(
                        "[{}] agent still running after its final event, terminating",
                        session.id
                    );
                    process.terminate(grace).await
                }
            }
        }
    };

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    for handle in drains.iter_mut() {
        match tokio::time::timeout_at(deadline, &mut *handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[{}] drain task failed: {}", session.id, e),
            Err(_) => {
                log::warn!(
                    "[{}] agent output still open {:?} after exit, giving up",
                    session.id,
                    DRAIN_TIMEOUT
                );
                handle.abort();
            }
        }
    }

    session.finish(exit);
}

async fn drain_stdout<R>(session: Arc<Session>, decoder: SharedDecoder, mut stdout: R)
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    handle_stdout_line(&session, &decoder, &line);
                }
            }
            Err(e) => {
                log::warn!("[{}] failed to read agent stdout: {}", session.id, e);
                session.append(EventKind::Error {
                    message: format!("Failed to read agent output: {e}"),
                    exit_code: None,
                });
                return;
            }
        }
    }

    // Attempted once; a partial record that does not decode is dropped.
    if let Some(line) = framer.finish() {
        handle_stdout_line(&session, &decoder, &line);
    }
}

fn handle_stdout_line(session: &Session, decoder: &SharedDecoder, line: &str) {
    session.transcript_line("STDOUT", line);

    let decoded = decoder
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .decode_line(line);

    match decoded {
        Ok(events) => {
            for event in events {
                session.append(event);
            }
        }
        Err(DecodeSkip::Empty) => {}
        Err(skip) => {
            log::debug!("[{}] skipped line: {}", session.id, skip);
            session.record_skip();
        }
    }
}

async fn drain_stderr<R>(session: Arc<Session>, decoder: SharedDecoder, stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                session.transcript_line("STDERR", &line);
                log::debug!("[{}] stderr: {}", session.id, line);

                let events = decoder
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .decode_stderr(&line);
                for event in events.into_iter().filter(|e| !e.is_terminal()) {
                    session.append(event);
                }
            }
            Ok(None) => break,
            // Non-UTF-8 or a broken pipe; stderr is diagnostics only.
            Err(e) => {
                log::debug!("[{}] stopped reading stderr: {}", session.id, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentFamily, Role};
    use crate::logging;
    use crate::session::SessionId;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            SessionId::new(),
            AgentFamily::Synthetic,
            None,
            logging::disabled(),
        ))
    }

    fn decoder() -> SharedDecoder {
        Arc::new(Mutex::new(AgentFamily::Synthetic.decoder()))
    }

    #[tokio::test]
    async fn malformed_line_then_done_yields_only_done() {
        let s = session();
        let input: &[u8] = b"not-json-at-all\n{\"type\":\"done\",\"message\":\"ok\",\"output\":\"x\"}\n";
        drain_stdout(Arc::clone(&s), decoder(), input).await;

        let events = s.events_since(0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::Done { .. }));
        assert_eq!(s.summary().skipped_lines, 1);
    }

    #[tokio::test]
    async fn trailing_partial_record_is_attempted_once() {
        let s = session();
        let input: &[u8] = b"{\"type\":\"message\",\"text\":\"hi\"}\n{\"type\":\"done\",\"out";
        drain_stdout(Arc::clone(&s), decoder(), input).await;

        let events = s.events_since(0);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::Message {
                role: Role::Assistant,
                ..
            }
        ));
        assert!(!s.is_terminal());
    }

    #[tokio::test]
    async fn complete_trailing_record_without_newline_is_kept() {
        let s = session();
        let input: &[u8] = b"{\"type\":\"done\",\"output\":\"tail\"}";
        drain_stdout(Arc::clone(&s), decoder(), input).await;
        assert!(s.is_terminal());
    }

    mod fuzz {
        use super::*;
        use crate::shell::AgentExit;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        fn random_line(rng: &mut StdRng) -> String {
            match rng.gen_range(0..6) {
                0 => (0..rng.gen_range(0..80))
                    .map(|_| rng.gen_range(b' '..=b'~') as char)
                    .collect(),
                1 => r#"{"type":"step","phase":"#.to_string(),
                2 => r#"{"type":"heartbeat","n":1}"#.to_string(),
                3 => String::new(),
                4 => format!(
                    r#"{{"type":"step","phase":"p","message":"m","progress":{}}}"#,
                    rng.gen_range(0..=120)
                ),
                _ => r#"{"type":"message","text":"thinking"}"#.to_string(),
            }
        }

        #[tokio::test]
        async fn terminal_event_is_always_last() {
            let mut rng = StdRng::seed_from_u64(0x5eed);
            for _ in 0..200 {
                let mut lines: Vec<String> = (0..rng.gen_range(0..40))
                    .map(|_| random_line(&mut rng))
                    .collect();
                let at = rng.gen_range(0..=lines.len());
                lines.insert(at, r#"{"type":"done","message":"ok","output":"x"}"#.to_string());
                let input = lines.join("\n");

                let s = session();
                drain_stdout(Arc::clone(&s), decoder(), input.as_bytes()).await;
                s.finish(Ok(AgentExit {
                    code: Some(rng.gen_range(0..3)),
                    signal: None,
                }));

                let events = s.events_since(0);
                let terminal: Vec<usize> = events
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.is_terminal())
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(terminal, vec![events.len() - 1]);
                assert!(matches!(events[events.len() - 1].kind, EventKind::Done { .. }));

                let progress: Vec<u8> = events
                    .iter()
                    .filter_map(|e| match e.kind {
                        EventKind::Step {
                            progress_percent, ..
                        } => Some(progress_percent),
                        _ => None,
                    })
                    .collect();
                assert!(progress.windows(2).all(|w| w[0] <= w[1]));
                assert!(progress.iter().all(|p| *p <= 100));
            }
        }
    }

    #[tokio::test]
    async fn stderr_never_produces_events() {
        let s = session();
        let input: &[u8] = b"warning: something\n{\"type\":\"done\"}\n";
        drain_stderr(Arc::clone(&s), decoder(), input).await;
        assert!(s.is_empty());
    }
}

//! Stream Emitter: delivering a Session's log to one consumer.
//!
//! A [`Subscription`] is a cursor over the append-only log. It replays from
//! any offset, then waits for new events, and ends right after the terminal
//! event. [`StreamEmitter::pump`] pushes a subscription into a [`Transport`]
//! one event at a time.
//!
//! A consumer going away stops the pump and nothing else; the Session keeps
//! draining into its log for later subscribers unless the emitter was built
//! with `abort_on_disconnect`.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::agents::BridgeEvent;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote end is gone.
    #[error("transport disconnected")]
    Disconnected,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Push sink for events.
///
/// Implementations must hand each event to the remote end before returning
/// (no batching) and report `Disconnected` once the remote end is gone.
#[async_trait]
pub trait Transport: Send {
    async fn deliver(&mut self, event: &BridgeEvent) -> Result<(), TransportError>;
}

/// Live cursor over one Session's log.
#[derive(Debug)]
pub struct Subscription {
    session: Arc<Session>,
    offset: usize,
    len_rx: watch::Receiver<usize>,
    pending: VecDeque<BridgeEvent>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(session: Arc<Session>, offset: usize) -> Self {
        let len_rx = session.watch_len();
        Self {
            session,
            offset,
            len_rx,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Offset of the next event this subscription will yield.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Next event in log order, or `None` once the terminal event was
    /// yielded (or the offset is past a closed log).
    pub async fn next(&mut self) -> Option<BridgeEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                self.offset += 1;
                if event.is_terminal() {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(event);
            }
            if self.finished {
                return None;
            }

            // Mark the current length seen before reading, so an append
            // racing with the read still wakes us below.
            let _ = self.len_rx.borrow_and_update();
            let batch = self.session.events_since(self.offset);
            if !batch.is_empty() {
                self.pending.extend(batch);
                continue;
            }
            if self.session.is_terminal() {
                self.finished = true;
                return None;
            }
            if self.len_rx.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = BridgeEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|event| (event, subscription))
        })
    }
}

/// How a pump ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The terminal event was delivered.
    Completed,
    /// The consumer went away first.
    Disconnected,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamEmitter {
    abort_on_disconnect: bool,
}

impl StreamEmitter {
    pub fn new(abort_on_disconnect: bool) -> Self {
        Self {
            abort_on_disconnect,
        }
    }

    pub fn aborts_on_disconnect(&self) -> bool {
        self.abort_on_disconnect
    }

    /// Forward every event from `subscription` into `transport`.
    pub async fn pump<T>(&self, mut subscription: Subscription, transport: &mut T) -> EmitOutcome
    where
        T: Transport + ?Sized,
    {
        while let Some(event) = subscription.next().await {
            match transport.deliver(&event).await {
                Ok(()) => {}
                Err(TransportError::Encode(e)) => {
                    log::warn!("[{}] dropping unencodable event: {}", event.session_id, e);
                }
                Err(TransportError::Disconnected) => {
                    let session = subscription.session();
                    log::info!(
                        "[{}] consumer disconnected at offset {}",
                        session.id,
                        subscription.offset()
                    );
                    if self.abort_on_disconnect {
                        session.abort();
                    }
                    return EmitOutcome::Disconnected;
                }
            }
        }
        EmitOutcome::Completed
    }
}

/// Frame one event for Server-Sent Events: `data: <json>\n\n`.
pub fn sse_frame(event: &BridgeEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Writes SSE frames to any async writer, flushing after each one.
#[derive(Debug)]
pub struct WriterTransport<W> {
    writer: W,
}

impl<W> WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> Transport for WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, event: &BridgeEvent) -> Result<(), TransportError> {
        let frame = sse_frame(event)?;
        let written = async {
            self.writer.write_all(frame.as_bytes()).await?;
            self.writer.flush().await
        };
        written.await.map_err(|e| {
            log::debug!("writer transport closed: {e}");
            TransportError::Disconnected
        })
    }
}

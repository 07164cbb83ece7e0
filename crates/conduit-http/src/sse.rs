//! Server-Sent Events delivery of a Session's log.
//!
//! Each stream gets its own pump task feeding a bounded channel that axum
//! drains into the response body. A dropped response closes the channel,
//! which the pump sees as a disconnect.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::sse::{Event, KeepAlive, Sse};
use conduit_core::stream::TransportError;
use conduit_core::{BridgeEvent, StreamEmitter, Subscription, Transport};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 64;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type Frame = Result<Event, Infallible>;

/// Hands each event to the response body as one `data:` frame.
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn deliver(&mut self, event: &BridgeEvent) -> Result<(), TransportError> {
        let json = serde_json::to_string(event)?;
        self.tx
            .send(Ok(Event::default().data(json)))
            .await
            .map_err(|_| TransportError::Disconnected)
    }
}

/// Start pumping `subscription` and return the SSE response body.
pub fn event_stream(
    emitter: StreamEmitter,
    subscription: Subscription,
) -> Sse<impl Stream<Item = Frame>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let closed = tx.clone();
    let session = subscription.session().clone();

    tokio::spawn(async move {
        let mut transport = ChannelTransport::new(tx);
        tokio::select! {
            _ = emitter.pump(subscription, &mut transport) => {}
            // An idle agent produces nothing to fail on, so watch the
            // receiver directly.
            _ = closed.closed() => {
                log::info!("[{}] SSE client went away", session.id);
                if emitter.aborts_on_disconnect() {
                    session.abort();
                }
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

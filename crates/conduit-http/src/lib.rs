//! HTTP front end for the Conduit bridge.
//!
//! Exposes the session registry via REST and streams session logs as
//! Server-Sent Events.

mod routes;
mod sse;
mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use routes::ApiResponse;
pub use sse::ChannelTransport;
pub use state::SharedState;

/// Build the application router.
pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route("/api/sessions/{id}", get(routes::get_session))
        .route("/api/sessions/{id}/events", get(routes::get_events))
        .route("/api/sessions/{id}/stream", get(routes::stream_events))
        .route("/api/sessions/{id}/abort", post(routes::abort_session))
        .route("/api/commit-message", post(routes::commit_message))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on `addr` until `shutdown` resolves.
pub async fn serve<F>(state: Arc<SharedState>, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            shutdown.await;
            log::info!("HTTP server shutting down");
        })
        .await
}

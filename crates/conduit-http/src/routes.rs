//! REST handlers.
//!
//! Every JSON response uses the same `{success, data, error}` envelope.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conduit_core::drivers::{CommitMessageDriver, DriverError};
use conduit_core::session::SessionError;
use conduit_core::spawn::SpawnError;
use conduit_core::{AgentFamily, AgentRequest, SessionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::sse;
use crate::state::SharedState;

type ApiResult = (StatusCode, Json<ApiResponse>);

/// Response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn ok(data: serde_json::Value) -> ApiResult {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
}

fn err(status: StatusCode, error: impl ToString) -> ApiResult {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }),
    )
}

fn to_data<T: Serialize>(value: &T) -> ApiResult {
    match serde_json::to_value(value) {
        Ok(data) => ok(data),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

fn parse_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiResult> {
    serde_json::from_value(body)
        .map_err(|e| err(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)))
}

fn session_error(e: SessionError) -> ApiResult {
    let status = match &e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Spawn(
            SpawnError::NotFound(_) | SpawnError::PermissionDenied(_) | SpawnError::InvalidCommand(_),
        ) => StatusCode::BAD_REQUEST,
        SessionError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    err(status, e)
}

fn driver_error(e: DriverError) -> ApiResult {
    match e {
        DriverError::Spawn(e) => session_error(e),
        DriverError::NothingStaged => err(StatusCode::BAD_REQUEST, e),
        DriverError::TimedOut(_) => err(StatusCode::GATEWAY_TIMEOUT, e),
        DriverError::Aborted | DriverError::AgentFailed { .. } | DriverError::NoOutput => {
            err(StatusCode::BAD_GATEWAY, e)
        }
        DriverError::Git(_) | DriverError::Io(_) => err(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    family: AgentFamily,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    working_dir: String,
    model: Option<String>,
    binary_path: Option<String>,
    args: Option<Vec<String>>,
}

impl From<CreateSessionRequest> for AgentRequest {
    fn from(request: CreateSessionRequest) -> Self {
        AgentRequest {
            family: Some(request.family),
            prompt: request.prompt,
            working_dir: request.working_dir,
            model: request.model,
            binary_path: request.binary_path,
            args: request.args,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitMessageRequest {
    working_dir: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OffsetQuery {
    #[serde(default)]
    offset: usize,
}

pub async fn health(State(state): State<Arc<SharedState>>) -> ApiResult {
    ok(serde_json::json!({
        "status": "ok",
        "sessions": state.manager.list_sessions().len(),
    }))
}

pub async fn create_session(
    State(state): State<Arc<SharedState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let request: CreateSessionRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if request.binary_path.is_some() || request.args.is_some() {
        if !state.config.allow_binary_override {
            return err(
                StatusCode::FORBIDDEN,
                "binaryPath and args are disabled (set allowBinaryOverride to enable)",
            );
        }
        if request.family != AgentFamily::Synthetic {
            return err(
                StatusCode::BAD_REQUEST,
                "binaryPath and args are only accepted for the synthetic family",
            );
        }
    }
    if request.family != AgentFamily::Synthetic && request.prompt.trim().is_empty() {
        return err(StatusCode::BAD_REQUEST, "Missing prompt");
    }

    let invocation = state.config.invocation(request.into());
    match state.manager.create_session(invocation) {
        Ok(session) => ok(serde_json::json!({ "sessionId": session.id })),
        Err(e) => {
            log::warn!("Failed to create session: {}", e);
            session_error(e)
        }
    }
}

pub async fn list_sessions(State(state): State<Arc<SharedState>>) -> ApiResult {
    to_data(&state.manager.list_sessions())
}

pub async fn get_session(
    State(state): State<Arc<SharedState>>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult {
    let id = SessionId::from(id.as_str());
    match state.manager.get_session(&id) {
        Some(session) => to_data(&session.summary()),
        None => session_error(SessionError::NotFound(id)),
    }
}

pub async fn get_events(
    State(state): State<Arc<SharedState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<OffsetQuery>,
) -> ApiResult {
    match state
        .manager
        .get_events(&SessionId::from(id.as_str()), query.offset)
    {
        Ok(events) => to_data(&events),
        Err(e) => session_error(e),
    }
}

pub async fn stream_events(
    State(state): State<Arc<SharedState>>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<OffsetQuery>,
) -> Response {
    match state
        .manager
        .subscribe(&SessionId::from(id.as_str()), query.offset)
    {
        Ok(subscription) => sse::event_stream(state.emitter, subscription).into_response(),
        Err(e) => session_error(e).into_response(),
    }
}

pub async fn abort_session(
    State(state): State<Arc<SharedState>>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult {
    match state.manager.abort(&SessionId::from(id.as_str())) {
        Ok(aborted) => ok(serde_json::json!({ "aborted": aborted })),
        Err(e) => session_error(e),
    }
}

pub async fn commit_message(
    State(state): State<Arc<SharedState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let request: CommitMessageRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.working_dir.is_empty() {
        return err(StatusCode::BAD_REQUEST, "Missing workingDir");
    }

    let driver = CommitMessageDriver::new(Arc::clone(&state.manager), Arc::clone(&state.config));
    match driver.generate(Path::new(&request.working_dir)).await {
        Ok(message) => ok(serde_json::json!({ "message": message })),
        Err(e) => {
            log::warn!("Commit message generation failed: {}", e);
            driver_error(e)
        }
    }
}

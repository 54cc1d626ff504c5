//! Synchronous HTTP fallback.
//!
//! Same operations as the real-time channel, one request per call. Bodies
//! are JSON; responses are the same `type`-tagged messages the WebSocket
//! sends. Errors come back as an `error` message whose `code` equals the
//! HTTP status. Mutations made here are broadcast to every attached
//! connection.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rookery_protocol::{Codec, Evaluation, ServerMessage, SessionId};
use rookery_rules::{CandidateMove, RulesEngine};
use rookery_session::{AuditLog, EngineMove, NewSession, SessionError, SnapshotStore};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::server::ServerState;

type AppState<R, S, L, C> = State<Arc<ServerState<R, S, L, C>>>;

pub(crate) fn router<R, S, L, C>(state: Arc<ServerState<R, S, L, C>>) -> Router
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    Router::new()
        .route("/games", post(create_game::<R, S, L, C>))
        .route("/games/{id}", get(get_game::<R, S, L, C>))
        .route("/games/{id}/join", post(join_game::<R, S, L, C>))
        .route("/games/{id}/move", post(submit_move::<R, S, L, C>))
        .route("/games/{id}/ai-move", post(submit_engine_move::<R, S, L, C>))
        .route("/games/{id}/resign", post(resign::<R, S, L, C>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MoveBody {
    from: String,
    to: String,
    #[serde(default)]
    promotion: Option<char>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineMoveBody {
    #[serde(rename = "move")]
    compact: String,
    #[serde(default)]
    thinking_time_ms: Option<u64>,
    #[serde(default)]
    evaluation: Option<Evaluation>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

struct ApiError {
    code: u16,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ServerMessage::error(self.code, self.message))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn session_id(raw: String) -> Result<SessionId, ApiError> {
    SessionId::new(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn body<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}

/// Like [`body`], but an empty body means "all fields absent".
fn optional_body<T: DeserializeOwned + Default>(bytes: &Bytes) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        Ok(T::default())
    } else {
        body(bytes)
    }
}

fn ok(msg: ServerMessage) -> Response {
    Json(msg).into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_game<R, S, L, C>(State(state): AppState<R, S, L, C>, bytes: Bytes) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let request: NewSession = body(&bytes)?;
    let created = state.directory.create(request).await?;
    Ok((StatusCode::CREATED, Json(ServerMessage::Created(created))).into_response())
}

async fn get_game<R, S, L, C>(
    State(state): AppState<R, S, L, C>,
    Path(id): Path<String>,
) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let id = session_id(id)?;
    let game = state.directory.state(&id).await?;
    Ok(ok(ServerMessage::GameState(game)))
}

async fn join_game<R, S, L, C>(
    State(state): AppState<R, S, L, C>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let id = session_id(id)?;
    let TokenBody { token } = optional_body(&bytes)?;
    let joined = state.directory.join(&id, token, None).await?;
    Ok(ok(ServerMessage::Joined(joined)))
}

async fn submit_move<R, S, L, C>(
    State(state): AppState<R, S, L, C>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let id = session_id(id)?;
    let MoveBody {
        from,
        to,
        promotion,
        token,
    } = body(&bytes)?;
    let result = state
        .directory
        .submit_move(&id, CandidateMove::new(from, to, promotion), token, None)
        .await?;
    Ok(ok(ServerMessage::MoveResult(result)))
}

async fn submit_engine_move<R, S, L, C>(
    State(state): AppState<R, S, L, C>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let id = session_id(id)?;
    let EngineMoveBody {
        compact,
        thinking_time_ms,
        evaluation,
    } = body(&bytes)?;
    let proposal = EngineMove {
        compact,
        thinking_time_ms,
        evaluation,
    };
    let result = state
        .directory
        .submit_engine_move(&id, proposal, None)
        .await?;
    Ok(ok(ServerMessage::MoveResult(result)))
}

async fn resign<R, S, L, C>(
    State(state): AppState<R, S, L, C>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let id = session_id(id)?;
    let TokenBody { token } = optional_body(&bytes)?;
    let game = state.directory.resign(&id, token, None).await?;
    Ok(ok(ServerMessage::GameState(game)))
}

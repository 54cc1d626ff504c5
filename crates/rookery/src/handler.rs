//! Per-connection handler: attach handshake and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `attach` → bind the connection to one session
//!   2. Register with the session actor → it pushes the first `game_state`
//!   3. Loop: forward actor broadcasts out, dispatch client messages in

use std::future::Future;
use std::sync::Arc;

use rookery_protocol::{ClientMessage, Codec, ProtocolError, ServerMessage, SessionId};
use rookery_rules::{CandidateMove, RulesEngine};
use rookery_session::{AuditLog, EngineMove, SessionError, SessionHandle, SnapshotStore};
use rookery_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::RookeryError;
use crate::server::ServerState;

/// Drop guard that detaches the connection from its session actor.
///
/// `Drop` is synchronous, so the detach is sent from a spawned task.
struct AttachmentGuard {
    handle: SessionHandle,
    conn_id: ConnectionId,
}

impl Drop for AttachmentGuard {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        let conn_id = self.conn_id;
        tokio::spawn(async move {
            handle.detach(conn_id).await;
        });
    }
}

/// What the connection knows about itself after `attach`.
struct Binding {
    session_id: SessionId,
    token: Option<String>,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<R, S, L, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<R, S, L, C>>,
) -> Result<(), RookeryError>
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let mut binding = perform_handshake(&conn, &state).await?;
    let session_id = binding.session_id.clone();

    // --- Step 2: Register with the actor ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, side) = match state
        .directory
        .attach(&session_id, conn_id, tx, binding.token.clone())
        .await
    {
        Ok(attached) => attached,
        Err(e) => {
            send_error(&conn, &state.codec, e.code(), &e.to_string()).await?;
            return Err(e.into());
        }
    };
    let mut guard = AttachmentGuard { handle, conn_id };

    tracing::info!(%conn_id, %session_id, ?side, "connection attached");

    // --- Step 3: Message loop ---
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(msg) => send_message(&conn, &state.codec, &msg).await?,
                None => {
                    // The actor stopped under us; bind to its successor.
                    let (tx, next_rx) = mpsc::unbounded_channel();
                    match state
                        .directory
                        .attach(&session_id, conn_id, tx, binding.token.clone())
                        .await
                    {
                        Ok((handle, _)) => {
                            guard.handle = handle;
                            rx = next_rx;
                            tracing::debug!(%conn_id, %session_id, "re-attached to restarted actor");
                        }
                        Err(e) => {
                            send_error(&conn, &state.codec, e.code(), &e.to_string()).await?;
                            break;
                        }
                    }
                }
            },

            inbound = tokio::time::timeout(state.config.idle_timeout, conn.recv()) => {
                let data = match inbound {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(%conn_id, "connection idle, closing");
                        let _ = conn.close().await;
                        break;
                    }
                };

                let msg: ClientMessage = match state.codec.decode(&data) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "failed to decode message");
                        send_error(&conn, &state.codec, 400, &e.to_string()).await?;
                        continue;
                    }
                };

                handle_client_message(&conn, &state, &mut binding, msg).await?;
            }
        }
    }

    // guard drops here → detach fires.
    Ok(())
}

/// Waits for the `attach` message that must open every connection.
async fn perform_handshake<R, S, L, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<R, S, L, C>>,
) -> Result<Binding, RookeryError>
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before attach".into()).into());
        }
        Ok(Err(e)) => return Err(RookeryError::Transport(e)),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("attach timed out".into()).into());
        }
    };

    let msg: ClientMessage = match state.codec.decode(&data) {
        Ok(msg) => msg,
        Err(e) => {
            send_error(conn, &state.codec, 400, &e.to_string()).await?;
            return Err(e.into());
        }
    };

    match msg {
        ClientMessage::Attach { session_id, token } => Ok(Binding { session_id, token }),
        _ => {
            send_error(conn, &state.codec, 400, "expected attach").await?;
            Err(ProtocolError::InvalidMessage("first message must be attach".into()).into())
        }
    }
}

/// Routes one decoded client message to the session and replies.
async fn handle_client_message<R, S, L, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<R, S, L, C>>,
    binding: &mut Binding,
    msg: ClientMessage,
) -> Result<(), RookeryError>
where
    R: RulesEngine,
    S: SnapshotStore,
    L: AuditLog,
    C: Codec,
{
    let directory = &state.directory;
    let id = &binding.session_id;
    let origin = Some(conn.id());

    let reply = match msg {
        ClientMessage::Attach { .. } => {
            return send_error(conn, &state.codec, 400, "already attached").await;
        }

        ClientMessage::Join { token } => {
            let token = token.or_else(|| binding.token.clone());
            bounded(state, directory.join(id, token, origin))
                .await
                .map(|joined| {
                    binding.token = Some(joined.token.clone());
                    ServerMessage::Joined(joined)
                })
        }

        ClientMessage::Move {
            from,
            to,
            promotion,
            token,
        } => {
            let candidate = CandidateMove::new(from, to, promotion);
            let token = token.or_else(|| binding.token.clone());
            bounded(state, directory.submit_move(id, candidate, token, origin))
                .await
                .map(ServerMessage::MoveResult)
        }

        ClientMessage::AiMove {
            compact,
            thinking_time_ms,
            evaluation,
        } => {
            let proposal = EngineMove {
                compact,
                thinking_time_ms,
                evaluation,
            };
            bounded(state, directory.submit_engine_move(id, proposal, origin))
                .await
                .map(ServerMessage::MoveResult)
        }

        ClientMessage::Resign { token } => {
            let token = token.or_else(|| binding.token.clone());
            bounded(state, directory.resign(id, token, origin))
                .await
                .map(ServerMessage::GameState)
        }

        ClientMessage::GetState => bounded(state, directory.state(id))
            .await
            .map(ServerMessage::GameState),
    };

    match reply {
        Ok(msg) => send_message(conn, &state.codec, &msg).await,
        Err(RequestFailure::TimedOut) => {
            tracing::warn!(conn_id = %conn.id(), session_id = %binding.session_id, "request timed out");
            send_error(
                conn,
                &state.codec,
                504,
                "request timed out; send get_state to re-sync",
            )
            .await
        }
        Err(RequestFailure::Session(e)) => {
            tracing::debug!(conn_id = %conn.id(), error = %e, "request rejected");
            send_error(conn, &state.codec, e.code(), &e.to_string()).await
        }
    }
}

enum RequestFailure {
    TimedOut,
    Session(SessionError),
}

/// Runs a session call under the configured request timeout.
async fn bounded<R, S, L, C, T>(
    state: &ServerState<R, S, L, C>,
    call: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, RequestFailure> {
    match tokio::time::timeout(state.config.request_timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RequestFailure::Session(e)),
        Err(_) => Err(RequestFailure::TimedOut),
    }
}

async fn send_message<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    msg: &ServerMessage,
) -> Result<(), RookeryError> {
    let bytes = codec.encode(msg)?;
    conn.send(&bytes).await.map_err(RookeryError::Transport)
}

/// Sends an `error` message to the client.
async fn send_error<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    code: u16,
    message: &str,
) -> Result<(), RookeryError> {
    send_message(conn, codec, &ServerMessage::error(code, message)).await
}

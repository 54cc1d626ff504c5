//! Session actor: one Tokio task per live session id.
//!
//! The actor owns the resident copy of its [`Session`] and the
//! [`ConnectionRegistry`] for that session. Commands arrive over a bounded
//! channel and run to completion one at a time, so two moves submitted at
//! once can never interleave.
//!
//! Every mutation follows the same path:
//!
//! ```text
//! rehydrate → validate → apply to a copy → save snapshot → commit
//!           → queue audit rows → reply → broadcast to everyone else
//! ```
//!
//! A failed save leaves the resident state untouched and broadcasts
//! nothing. Audit rows go to a per-actor writer task, so they land in the
//! order the actor produced them without delaying the reply.

use std::sync::Arc;

use chrono::Utc;
use rookery_protocol::{
    Created, Evaluation, GameMode, GameState, Joined, MoveResult, Outcome, ServerMessage,
    SessionId, Side, random_hex,
};
use rookery_rules::{CandidateMove, RulesEngine, Terminal};
use rookery_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    AuditLog, ConnectionRegistry, ConnectionSender, MoveEntry, NewSession, OutcomeEntry, PlayedBy,
    Session, SessionConfig, SessionError, SnapshotStore,
};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// A proposed move from the engine playing the non-human side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMove {
    /// Coordinate notation: `[a-h][1-8][a-h][1-8][qrbn]?`.
    pub compact: String,
    pub thinking_time_ms: Option<u64>,
    pub evaluation: Option<Evaluation>,
}

impl EngineMove {
    pub fn new(compact: impl Into<String>) -> Self {
        Self {
            compact: compact.into(),
            thinking_time_ms: None,
            evaluation: None,
        }
    }
}

/// Commands accepted by a session actor.
///
/// `origin` names the connection a request came from, if any. The
/// originator gets the result on its reply channel and is left out of the
/// broadcast that follows.
pub(crate) enum SessionCommand {
    Create {
        request: NewSession,
        reply: Reply<Created>,
    },
    Join {
        token: Option<String>,
        origin: Option<ConnectionId>,
        reply: Reply<Joined>,
    },
    SubmitMove {
        candidate: CandidateMove,
        token: Option<String>,
        origin: Option<ConnectionId>,
        reply: Reply<MoveResult>,
    },
    SubmitEngineMove {
        proposal: EngineMove,
        origin: Option<ConnectionId>,
        reply: Reply<MoveResult>,
    },
    Resign {
        token: Option<String>,
        origin: Option<ConnectionId>,
        reply: Reply<GameState>,
    },
    GetSnapshot {
        reply: Reply<Session>,
    },
    GetState {
        reply: Reply<GameState>,
    },
    Attach {
        conn: ConnectionId,
        sender: ConnectionSender,
        token: Option<String>,
        reply: Reply<Option<Side>>,
    },
    Detach {
        conn: ConnectionId,
    },
    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone. Methods fail with [`SessionError::Evicted`] when the
/// actor stopped before taking the command (safe to retry against a fresh
/// actor) and [`SessionError::Unavailable`] when it stopped before
/// replying.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::Sender<SessionCommand>,
    stopped: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns `true` once the actor has stopped taking commands.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns `true` once the actor task has exited. A closed actor may
    /// still be draining queued commands; a stopped one never touches the
    /// store again.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Waits until the actor task has exited.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        // An error means the signal was dropped, which also happens only
        // when the actor is gone.
        let _ = stopped.wait_for(|done| *done).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Evicted(self.session_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Unavailable(self.session_id.clone()))?
    }

    /// Initializes the session. Fails with `AlreadyExists` if it has a
    /// resident or stored snapshot.
    pub async fn create(&self, request: NewSession) -> Result<Created, SessionError> {
        self.request(|reply| SessionCommand::Create { request, reply })
            .await
    }

    /// Takes (or re-confirms) a seat in a two-player session.
    pub async fn join(
        &self,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<Joined, SessionError> {
        self.request(|reply| SessionCommand::Join {
            token,
            origin,
            reply,
        })
        .await
    }

    pub async fn submit_move(
        &self,
        candidate: CandidateMove,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<MoveResult, SessionError> {
        self.request(|reply| SessionCommand::SubmitMove {
            candidate,
            token,
            origin,
            reply,
        })
        .await
    }

    pub async fn submit_engine_move(
        &self,
        proposal: EngineMove,
        origin: Option<ConnectionId>,
    ) -> Result<MoveResult, SessionError> {
        self.request(|reply| SessionCommand::SubmitEngineMove {
            proposal,
            origin,
            reply,
        })
        .await
    }

    pub async fn resign(
        &self,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<GameState, SessionError> {
        self.request(|reply| SessionCommand::Resign {
            token,
            origin,
            reply,
        })
        .await
    }

    /// The persisted aggregate, seat tokens included.
    pub async fn snapshot(&self) -> Result<Session, SessionError> {
        self.request(|reply| SessionCommand::GetSnapshot { reply })
            .await
    }

    /// The wire view of the session.
    pub async fn state(&self) -> Result<GameState, SessionError> {
        self.request(|reply| SessionCommand::GetState { reply }).await
    }

    /// Registers a connection. The actor pushes a `game_state` onto
    /// `sender` straight away and every later broadcast after it.
    ///
    /// Returns the side `token` holds, if any.
    pub async fn attach(
        &self,
        conn: ConnectionId,
        sender: ConnectionSender,
        token: Option<String>,
    ) -> Result<Option<Side>, SessionError> {
        self.request(|reply| SessionCommand::Attach {
            conn,
            sender,
            token,
            reply,
        })
        .await
    }

    /// Unregisters a connection. Ignored if the actor already stopped.
    pub async fn detach(&self, conn: ConnectionId) {
        let _ = self.sender.send(SessionCommand::Detach { conn }).await;
    }

    /// Asks the actor to finish its queued commands and stop.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionCommand::Shutdown).await;
    }
}

/// What a successful mutation hands back: the caller's value plus the
/// message everyone else should see.
type Applied<T> = (T, Option<ServerMessage>);

/// One row for the audit writer.
enum AuditRecord {
    Move(MoveEntry),
    Outcome(OutcomeEntry),
}

/// Flips the handle's stop flag when dropped, including on panic.
struct StopSignal(watch::Sender<bool>);

impl Drop for StopSignal {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

struct SessionActor<R, S> {
    session_id: SessionId,
    rules: Arc<R>,
    store: Arc<S>,
    audit: mpsc::UnboundedSender<AuditRecord>,
    config: SessionConfig,
    /// Resident state; `None` until created or rehydrated.
    state: Option<Session>,
    registry: ConnectionRegistry,
    receiver: mpsc::Receiver<SessionCommand>,
    closing: bool,
    // Declared last so it fires after everything else is dropped.
    _stop: StopSignal,
}

impl<R: RulesEngine, S: SnapshotStore> SessionActor<R, S> {
    async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "session actor started");

        loop {
            let next = if self.registry.is_empty() && !self.closing {
                match tokio::time::timeout(self.config.idle_timeout, self.receiver.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.close_inbox("idle");
                        continue;
                    }
                }
            } else {
                self.receiver.recv().await
            };
            let Some(cmd) = next else { break };
            self.handle(cmd).await;
        }

        // Dropping the registry closes every attached connection's
        // channel; handlers re-resolve and re-attach.
        tracing::info!(
            session_id = %self.session_id,
            resident = self.state.is_some(),
            "session actor stopped"
        );
    }

    /// Stops accepting commands. Already-queued commands still run.
    fn close_inbox(&mut self, reason: &'static str) {
        if !self.closing {
            tracing::debug!(session_id = %self.session_id, reason, "session actor closing");
            self.closing = true;
            self.receiver.close();
        }
    }

    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Create { request, reply } => {
                let result = self.handle_create(request).await;
                let _ = reply.send(result);
            }
            SessionCommand::Join {
                token,
                origin,
                reply,
            } => {
                let result = self.handle_join(token, origin).await;
                self.respond(reply, result, origin);
            }
            SessionCommand::SubmitMove {
                candidate,
                token,
                origin,
                reply,
            } => {
                let result = self.handle_move(candidate, token).await;
                self.respond(reply, result, origin);
            }
            SessionCommand::SubmitEngineMove {
                proposal,
                origin,
                reply,
            } => {
                let result = self.handle_engine_move(proposal).await;
                self.respond(reply, result, origin);
            }
            SessionCommand::Resign {
                token,
                origin,
                reply,
            } => {
                let result = self.handle_resign(token).await;
                self.respond(reply, result, origin);
            }
            SessionCommand::GetSnapshot { reply } => {
                let _ = reply.send(self.current().await);
            }
            SessionCommand::GetState { reply } => {
                let result = match self.current().await {
                    Ok(session) => self.game_state(&session),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Attach {
                conn,
                sender,
                token,
                reply,
            } => {
                let result = self.handle_attach(conn, sender, token).await;
                let _ = reply.send(result);
            }
            SessionCommand::Detach { conn } => {
                self.registry.detach(conn);
            }
            SessionCommand::Shutdown => self.close_inbox("shutdown"),
        }
    }

    /// Replies to the caller first, then broadcasts to every other
    /// attached connection.
    fn respond<T>(
        &self,
        reply: Reply<T>,
        result: Result<Applied<T>, SessionError>,
        origin: Option<ConnectionId>,
    ) {
        match result {
            Ok((value, broadcast)) => {
                let _ = reply.send(Ok(value));
                if let Some(msg) = broadcast {
                    let delivered = self.registry.broadcast_except(origin, &msg);
                    tracing::debug!(session_id = %self.session_id, delivered, "broadcast");
                }
            }
            Err(e) => {
                let seat = origin.and_then(|conn| self.registry.side_of(conn));
                tracing::debug!(
                    session_id = %self.session_id,
                    origin = ?origin,
                    seat = ?seat,
                    error = %e,
                    "request rejected"
                );
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Returns a copy of the resident state, rehydrating it from the store
    /// first if needed.
    async fn current(&mut self) -> Result<Session, SessionError> {
        if self.state.is_none() {
            if let Some(session) = self.store.load(&self.session_id).await? {
                tracing::debug!(
                    session_id = %self.session_id,
                    moves = session.move_log.len(),
                    "session rehydrated"
                );
                self.state = Some(session);
            }
        }
        self.state
            .clone()
            .ok_or_else(|| SessionError::SessionNotFound(self.session_id.clone()))
    }

    /// Saves `next` and only then makes it the resident state.
    async fn commit(&mut self, next: Session) -> Result<(), SessionError> {
        if let Err(e) = self.store.save(&next).await {
            tracing::error!(session_id = %self.session_id, error = %e, "snapshot save failed");
            return Err(e.into());
        }
        self.state = Some(next);
        Ok(())
    }

    fn game_state(&self, session: &Session) -> Result<GameState, SessionError> {
        let info = self
            .rules
            .inspect(&session.position)
            .map_err(SessionError::Rules)?;
        Ok(session.game_state(&info))
    }

    async fn handle_create(&mut self, request: NewSession) -> Result<Created, SessionError> {
        if self.state.is_some() || self.store.load(&self.session_id).await?.is_some() {
            return Err(SessionError::AlreadyExists(self.session_id.clone()));
        }

        let token = request.token.unwrap_or_else(random_hex);
        let session = Session::new(
            self.session_id.clone(),
            request.mode,
            request.creator_side,
            token.clone(),
            self.rules.start_position(),
            request.engine_difficulty,
        );
        let state = self.game_state(&session)?;
        self.commit(session).await?;

        tracing::info!(
            session_id = %self.session_id,
            mode = ?request.mode,
            creator = %request.creator_side,
            "session created"
        );
        Ok(Created {
            session_id: self.session_id.clone(),
            side: request.creator_side,
            token,
            state,
        })
    }

    async fn handle_join(
        &mut self,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<Applied<Joined>, SessionError> {
        let mut next = self.current().await?;
        if next.mode != GameMode::TwoPlayer {
            return Err(SessionError::InvalidMode(
                "join is only available in two-player sessions".into(),
            ));
        }
        ensure_active(&next)?;

        if let Some(held) = token.as_deref().and_then(|t| next.seats.side_of(t)) {
            if let Some(conn) = origin {
                self.registry.set_side(conn, held);
            }
            let joined = Joined {
                session_id: self.session_id.clone(),
                side: held,
                token: token.unwrap_or_default(),
            };
            return Ok((joined, None));
        }

        let side = next.seats.open_side().ok_or(SessionError::SessionFull)?;
        let token = token.unwrap_or_else(random_hex);
        next.seats.bind(side, token.clone());
        next.touch();

        let state = self.game_state(&next)?;
        self.commit(next).await?;
        if let Some(conn) = origin {
            self.registry.set_side(conn, side);
        }

        tracing::info!(session_id = %self.session_id, %side, "seat taken");
        let joined = Joined {
            session_id: self.session_id.clone(),
            side,
            token,
        };
        Ok((joined, Some(ServerMessage::GameState(state))))
    }

    async fn handle_move(
        &mut self,
        candidate: CandidateMove,
        token: Option<String>,
    ) -> Result<Applied<MoveResult>, SessionError> {
        let session = self.current().await?;
        ensure_active(&session)?;

        let to_move = self.side_to_move(&session)?;
        match session.mode {
            GameMode::TwoPlayer => {
                if !session.seats.is_full() {
                    return Err(SessionError::WaitingForOpponent);
                }
                if token.is_none() || session.seats.get(to_move) != token.as_deref() {
                    return Err(SessionError::NotYourTurn);
                }
            }
            GameMode::SinglePlayerVsEngine => {
                if to_move != session.creator_side {
                    return Err(SessionError::NotYourTurn);
                }
            }
        }

        self.apply_move(session, candidate, PlayedBy::Human, None, None)
            .await
    }

    async fn handle_engine_move(
        &mut self,
        proposal: EngineMove,
    ) -> Result<Applied<MoveResult>, SessionError> {
        let session = self.current().await?;
        let Some(engine_side) = session.engine_side() else {
            return Err(SessionError::InvalidMode(
                "engine moves are only accepted in single-player sessions".into(),
            ));
        };
        ensure_active(&session)?;

        if self.side_to_move(&session)? != engine_side {
            return Err(SessionError::NotYourTurn);
        }
        let candidate =
            CandidateMove::parse_compact(&proposal.compact).map_err(SessionError::from_move)?;

        self.apply_move(
            session,
            candidate,
            PlayedBy::Engine,
            proposal.thinking_time_ms,
            proposal.evaluation,
        )
        .await
    }

    async fn apply_move(
        &mut self,
        session: Session,
        candidate: CandidateMove,
        played_by: PlayedBy,
        thinking_time_ms: Option<u64>,
        evaluation: Option<Evaluation>,
    ) -> Result<Applied<MoveResult>, SessionError> {
        let applied = self
            .rules
            .apply(&session.position, &candidate)
            .map_err(SessionError::from_move)?;

        let mut next = session;
        next.position = applied.position.clone();
        next.move_log.push(applied.record.clone());
        next.touch();
        if let Some(terminal) = applied.info.terminal {
            next.finish(terminal, applied.mover);
        }

        self.commit(next.clone()).await?;

        let move_number = u32::try_from(next.move_log.len()).unwrap_or(u32::MAX);
        tracing::debug!(
            session_id = %self.session_id,
            move_number,
            mv = %applied.record.human,
            ?played_by,
            "move applied"
        );

        self.record(AuditRecord::Move(MoveEntry {
            session_id: self.session_id.clone(),
            move_number,
            compact: applied.record.compact.clone(),
            human: applied.record.human.clone(),
            position_after: applied.position.clone(),
            evaluation,
            thinking_time_ms,
            played_by,
            engine_difficulty: match played_by {
                PlayedBy::Engine => next.engine_difficulty,
                PlayedBy::Human => None,
            },
            recorded_at: Utc::now(),
        }));
        if !next.is_active() {
            self.game_over(&next);
        }

        let result = MoveResult {
            success: true,
            move_number,
            position: applied.position,
            human_move: Some(applied.record.human.clone()),
            status: next.status,
            outcome: next.outcome,
            side_to_move: applied.info.side_to_move,
            in_check: applied.info.in_check,
            is_checkmate: applied.info.terminal == Some(Terminal::Checkmate),
            is_stalemate: applied.info.terminal == Some(Terminal::Stalemate),
            is_draw: next.outcome == Some(Outcome::Draw),
            last_move: Some(applied.record),
        };
        let broadcast = ServerMessage::MoveResult(result.clone());
        Ok((result, Some(broadcast)))
    }

    async fn handle_resign(
        &mut self,
        token: Option<String>,
    ) -> Result<Applied<GameState>, SessionError> {
        let mut next = self.current().await?;
        ensure_active(&next)?;

        let side = match next.mode {
            GameMode::SinglePlayerVsEngine => next.creator_side,
            GameMode::TwoPlayer => token
                .as_deref()
                .and_then(|t| next.seats.side_of(t))
                .ok_or(SessionError::UnknownSeat)?,
        };
        next.resign(side);
        next.touch();

        let state = self.game_state(&next)?;
        self.commit(next.clone()).await?;
        tracing::info!(session_id = %self.session_id, %side, "resigned");
        self.game_over(&next);

        Ok((state.clone(), Some(ServerMessage::GameState(state))))
    }

    async fn handle_attach(
        &mut self,
        conn: ConnectionId,
        sender: ConnectionSender,
        token: Option<String>,
    ) -> Result<Option<Side>, SessionError> {
        let session = self.current().await?;
        let side = token.as_deref().and_then(|t| session.seats.side_of(t));
        let state = self.game_state(&session)?;
        self.registry
            .attach(conn, sender, side, ServerMessage::GameState(state));
        Ok(side)
    }

    fn side_to_move(&self, session: &Session) -> Result<Side, SessionError> {
        self.rules
            .inspect(&session.position)
            .map(|info| info.side_to_move)
            .map_err(SessionError::Rules)
    }

    fn game_over(&self, session: &Session) {
        let Some(outcome) = session.outcome else {
            return;
        };
        tracing::info!(
            session_id = %self.session_id,
            status = %session.status,
            result = %outcome,
            "game over"
        );
        self.record(AuditRecord::Outcome(OutcomeEntry {
            session_id: self.session_id.clone(),
            status: session.status,
            outcome,
            ended_at: session.updated_at,
        }));
    }

    /// Queues a row for the audit writer. Never blocks.
    fn record(&self, row: AuditRecord) {
        if self.audit.send(row).is_err() {
            tracing::warn!(session_id = %self.session_id, "audit writer gone, row dropped");
        }
    }
}

/// Writes audit rows one at a time, in the order they were queued.
/// Exits once the actor drops its sender and the queue is empty.
async fn audit_writer<L: AuditLog>(
    audit: Arc<L>,
    mut rows: mpsc::UnboundedReceiver<AuditRecord>,
) {
    while let Some(row) = rows.recv().await {
        match row {
            AuditRecord::Move(entry) => {
                let session_id = entry.session_id.clone();
                let move_number = entry.move_number;
                if let Err(e) = audit.record_move(entry).await {
                    tracing::warn!(%session_id, move_number, error = %e, "audit move write failed");
                }
            }
            AuditRecord::Outcome(entry) => {
                let session_id = entry.session_id.clone();
                if let Err(e) = audit.record_outcome(entry).await {
                    tracing::warn!(%session_id, error = %e, "audit outcome write failed");
                }
            }
        }
    }
}

fn ensure_active(session: &Session) -> Result<(), SessionError> {
    if session.is_active() {
        Ok(())
    } else {
        Err(SessionError::SessionNotActive(session.status))
    }
}

/// Spawns an actor for `session_id` and returns its handle.
///
/// The actor starts empty and rehydrates from `store` on its first
/// command.
pub(crate) fn spawn_session<R: RulesEngine, S: SnapshotStore, L: AuditLog>(
    session_id: SessionId,
    rules: Arc<R>,
    store: Arc<S>,
    audit: Arc<L>,
    config: SessionConfig,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let (audit_tx, audit_rx) = mpsc::unbounded_channel();

    let actor = SessionActor {
        session_id: session_id.clone(),
        rules,
        store,
        audit: audit_tx,
        config,
        state: None,
        registry: ConnectionRegistry::new(),
        receiver: rx,
        closing: false,
        _stop: StopSignal(stop_tx),
    };

    tokio::spawn(audit_writer(audit, audit_rx));
    tokio::spawn(actor.run());

    SessionHandle {
        session_id,
        sender: tx,
        stopped: stop_rx,
    }
}

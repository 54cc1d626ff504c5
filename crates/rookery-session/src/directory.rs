//! Session directory: routes a session id to its single live actor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rookery_protocol::{Created, GameState, Joined, MoveResult, SessionId, Side};
use rookery_rules::{CandidateMove, RulesEngine};
use rookery_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::actor::spawn_session;
use crate::{
    AuditLog, ConnectionSender, EngineMove, NewSession, Session, SessionConfig, SessionError,
    SessionHandle, SnapshotStore,
};

/// Maps session ids to actors, spawning one on first use.
///
/// At most one live actor exists per id. Lookups happen under a lock, and
/// an entry is only replaced once its actor has fully exited: a closed
/// actor that is still draining queued commands keeps its entry, and
/// callers wait for it before a successor rehydrates from the store.
///
/// The convenience methods retry once when the actor they reached stopped
/// before accepting the command.
pub struct SessionDirectory<R, S, L> {
    rules: Arc<R>,
    store: Arc<S>,
    audit: Arc<L>,
    config: SessionConfig,
    actors: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl<R: RulesEngine, S: SnapshotStore, L: AuditLog> SessionDirectory<R, S, L> {
    pub fn new(rules: R, store: S, audit: L, config: SessionConfig) -> Self {
        Self {
            rules: Arc::new(rules),
            store: Arc::new(store),
            audit: Arc::new(audit),
            config,
            actors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live actor for `id`, spawning one if needed.
    ///
    /// If the previous actor is closed but still draining, waits for it to
    /// exit first, without holding the directory lock.
    pub async fn resolve(&self, id: &SessionId) -> SessionHandle {
        loop {
            let predecessor = {
                let mut actors = self.actors.lock().await;
                match actors.get(id) {
                    Some(handle) if !handle.is_closed() => return handle.clone(),
                    Some(handle) if !handle.is_stopped() => handle.clone(),
                    _ => {
                        actors.retain(|_, handle| !handle.is_stopped());
                        let handle = spawn_session(
                            id.clone(),
                            Arc::clone(&self.rules),
                            Arc::clone(&self.store),
                            Arc::clone(&self.audit),
                            self.config.clone(),
                        );
                        actors.insert(id.clone(), handle.clone());
                        return handle;
                    }
                }
            };
            tracing::debug!(session_id = %id, "waiting for previous actor to drain");
            predecessor.stopped().await;
        }
    }

    /// Stops the actor for `id`, if one is live, and waits for it to finish
    /// the commands already queued. Its state stays in the store.
    pub async fn evict(&self, id: &SessionId) -> bool {
        let handle = self.actors.lock().await.get(id).cloned();
        let Some(handle) = handle else {
            return false;
        };
        let was_live = !handle.is_closed();
        handle.shutdown().await;
        handle.stopped().await;
        if was_live {
            tracing::debug!(session_id = %id, "session evicted");
        }
        was_live
    }

    /// Number of actors currently live.
    pub async fn live_count(&self) -> usize {
        let actors = self.actors.lock().await;
        actors.values().filter(|handle| !handle.is_closed()).count()
    }

    async fn call<T, F, Fut>(&self, id: &SessionId, op: F) -> Result<T, SessionError>
    where
        F: Fn(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        match op(self.resolve(id).await).await {
            Err(SessionError::Evicted(_)) => {
                tracing::debug!(session_id = %id, "actor stopped, retrying on a fresh one");
                op(self.resolve(id).await).await
            }
            other => other,
        }
    }

    /// Creates a session, generating an id when the request has none.
    pub async fn create(&self, request: NewSession) -> Result<Created, SessionError> {
        let id = request
            .session_id
            .clone()
            .unwrap_or_else(SessionId::generate);
        self.call(&id, |handle| {
            let request = request.clone();
            async move { handle.create(request).await }
        })
        .await
    }

    pub async fn join(
        &self,
        id: &SessionId,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<Joined, SessionError> {
        self.call(id, |handle| {
            let token = token.clone();
            async move { handle.join(token, origin).await }
        })
        .await
    }

    pub async fn submit_move(
        &self,
        id: &SessionId,
        candidate: CandidateMove,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<MoveResult, SessionError> {
        self.call(id, |handle| {
            let candidate = candidate.clone();
            let token = token.clone();
            async move { handle.submit_move(candidate, token, origin).await }
        })
        .await
    }

    pub async fn submit_engine_move(
        &self,
        id: &SessionId,
        proposal: EngineMove,
        origin: Option<ConnectionId>,
    ) -> Result<MoveResult, SessionError> {
        self.call(id, |handle| {
            let proposal = proposal.clone();
            async move { handle.submit_engine_move(proposal, origin).await }
        })
        .await
    }

    pub async fn resign(
        &self,
        id: &SessionId,
        token: Option<String>,
        origin: Option<ConnectionId>,
    ) -> Result<GameState, SessionError> {
        self.call(id, |handle| {
            let token = token.clone();
            async move { handle.resign(token, origin).await }
        })
        .await
    }

    pub async fn snapshot(&self, id: &SessionId) -> Result<Session, SessionError> {
        self.call(id, |handle| async move { handle.snapshot().await })
            .await
    }

    pub async fn state(&self, id: &SessionId) -> Result<GameState, SessionError> {
        self.call(id, |handle| async move { handle.state().await })
            .await
    }

    /// Attaches a connection and returns the handle it is attached to, so
    /// the caller can detach from the same actor later.
    pub async fn attach(
        &self,
        id: &SessionId,
        conn: ConnectionId,
        sender: ConnectionSender,
        token: Option<String>,
    ) -> Result<(SessionHandle, Option<Side>), SessionError> {
        self.call(id, |handle| {
            let sender = sender.clone();
            let token = token.clone();
            async move {
                let side = handle.attach(conn, sender, token).await?;
                Ok((handle, side))
            }
        })
        .await
    }
}

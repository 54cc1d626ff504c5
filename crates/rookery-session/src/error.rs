//! Error types for the session layer.

use rookery_protocol::{GameStatus, SessionId};
use rookery_rules::RulesError;

/// Errors from a [`SnapshotStore`](crate::SnapshotStore) or an
/// [`AuditLog`](crate::AuditLog) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Errors returned by session operations.
///
/// Every variant maps to an HTTP-style status via [`SessionError::code`];
/// the real-time channel sends the same number in its `error` message.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The rules engine rejected the move, or it was not well-formed.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The operation does not exist in this session's mode.
    #[error("{0}")]
    InvalidMode(String),

    /// The requester does not hold the seat whose turn it is.
    #[error("not your turn")]
    NotYourTurn,

    /// The presented token holds no seat in this session.
    #[error("token does not hold a seat in this session")]
    UnknownSeat,

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The game already ended; terminal sessions accept no mutations.
    #[error("session is not active (status: {0})")]
    SessionNotActive(GameStatus),

    /// A two-player session still has an open seat.
    #[error("waiting for an opponent to join")]
    WaitingForOpponent,

    #[error("session is full")]
    SessionFull,

    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// The durable snapshot could not be written or read.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The stored position could not be interpreted by the rules engine.
    #[error("rules engine failure: {0}")]
    Rules(RulesError),

    /// The session actor stopped before accepting the command.
    #[error("session {0} was evicted")]
    Evicted(SessionId),

    /// The session actor stopped before replying.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}

impl SessionError {
    /// HTTP-style status code for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::IllegalMove(_) | Self::InvalidMode(_) => 400,
            Self::NotYourTurn | Self::UnknownSeat => 403,
            Self::SessionNotFound(_) => 404,
            Self::SessionNotActive(_)
            | Self::WaitingForOpponent
            | Self::SessionFull
            | Self::AlreadyExists(_) => 409,
            Self::Storage(_) | Self::Rules(_) => 500,
            Self::Evicted(_) | Self::Unavailable(_) => 503,
        }
    }

    /// Classifies a rules-engine error raised while applying a move.
    ///
    /// A rejected or malformed move is the caller's fault; an unparseable
    /// stored position is not.
    pub(crate) fn from_move(err: RulesError) -> Self {
        match err {
            RulesError::IllegalMove(m) | RulesError::MalformedMove(m) => Self::IllegalMove(m),
            RulesError::InvalidPosition(_) => Self::Rules(err),
        }
    }
}

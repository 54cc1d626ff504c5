//! Messages exchanged on the real-time channel.
//!
//! Every message is a JSON object tagged by `type`:
//!
//! ```text
//! client → server   attach | join | move | ai_move | resign | get_state
//! server → client   game_state | move_result | joined | created | error
//! ```
//!
//! The HTTP fallback returns the same server-side shapes, so a client can
//! switch channels without a second parser.

use serde::{Deserialize, Serialize};

use crate::{
    Evaluation, GameMode, GameStatus, MoveRecord, Outcome, SeatView, SessionId, Side,
};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A request sent by a client over the real-time channel.
///
/// Seat tokens are optional on every mutating request; when omitted the
/// server uses the token the connection presented at `attach` or `join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Handshake: bind this connection to a session. Must come first.
    #[serde(rename_all = "camelCase")]
    Attach {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Take the open seat of a two-player session.
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// A human move in coordinate form.
    Move {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion: Option<char>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// A move proposed by the engine playing the non-human side.
    #[serde(rename_all = "camelCase")]
    AiMove {
        #[serde(rename = "move")]
        compact: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking_time_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evaluation: Option<Evaluation>,
    },

    /// Resign on behalf of the requester's side.
    Resign {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Ask for a fresh `game_state`.
    GetState,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Full view of a session, sent on attach, on request, and after joins and
/// resignations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub position: String,
    pub seats: SeatView,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub move_log: Vec<MoveRecord>,
    pub side_to_move: Side,
    pub in_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<MoveRecord>,
    /// Only present for two-player sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for_opponent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_difficulty: Option<u32>,
}

/// Result of an applied move, sent to the mover and broadcast to everyone
/// else attached to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    pub success: bool,
    /// 1-based index of the move in the session's log.
    pub move_number: u32,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_move: Option<String>,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub side_to_move: Side,
    pub in_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_draw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<MoveRecord>,
}

/// Seat assignment handed back to a joining client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    pub session_id: SessionId,
    pub side: Side,
    pub token: String,
}

/// Response to session creation: the creator's credentials plus the
/// initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub session_id: SessionId,
    pub side: Side,
    pub token: String,
    pub state: GameState,
}

/// A structured rejection. `code` follows HTTP conventions and equals the
/// status the HTTP fallback responds with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: u16,
    pub message: String,
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameState),
    MoveResult(MoveResult),
    Joined(Joined),
    Created(Created),
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Shorthand for an `error` message.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            code,
            message: message.into(),
        })
    }
}

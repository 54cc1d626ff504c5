//! The session aggregate: everything that is persisted for one game.
//!
//! A [`Session`] is owned by exactly one actor while resident and lives as
//! a JSON snapshot in the [`SnapshotStore`](crate::SnapshotStore) the rest
//! of the time. Connections are never part of it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rookery_protocol::{
    GameMode, GameState, GameStatus, MoveRecord, Outcome, SeatOccupant, SeatView, SessionId, Side,
};
use rookery_rules::{PositionInfo, Terminal};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tuning for session actors.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long an actor with no attached connections waits for a command
    /// before it hibernates (drops its in-memory state and exits). The
    /// next request rehydrates it from the store.
    ///
    /// Default: 5 minutes.
    pub idle_timeout: Duration,

    /// Capacity of each actor's command channel.
    ///
    /// Default: 64.
    pub channel_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            channel_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Seats
// ---------------------------------------------------------------------------

/// Seat tokens per side. `None` is an open seat (or the engine's seat in
/// single-player sessions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    pub white: Option<String>,
    pub black: Option<String>,
}

impl Seats {
    /// The token bound to `side`, if any.
    pub fn get(&self, side: Side) -> Option<&str> {
        match side {
            Side::White => self.white.as_deref(),
            Side::Black => self.black.as_deref(),
        }
    }

    /// Binds `token` to `side`, replacing whatever was there.
    pub fn bind(&mut self, side: Side, token: String) {
        match side {
            Side::White => self.white = Some(token),
            Side::Black => self.black = Some(token),
        }
    }

    /// The side whose seat holds `token`.
    pub fn side_of(&self, token: &str) -> Option<Side> {
        [Side::White, Side::Black]
            .into_iter()
            .find(|side| self.get(*side) == Some(token))
    }

    /// The first open seat, white before black.
    pub fn open_side(&self) -> Option<Side> {
        [Side::White, Side::Black]
            .into_iter()
            .find(|side| self.get(*side).is_none())
    }

    pub fn is_full(&self) -> bool {
        self.white.is_some() && self.black.is_some()
    }
}

// ---------------------------------------------------------------------------
// NewSession
// ---------------------------------------------------------------------------

fn default_creator_side() -> Side {
    Side::White
}

/// Parameters for creating a session. Also the body of `POST /games`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub mode: GameMode,
    #[serde(default = "default_creator_side")]
    pub creator_side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_difficulty: Option<u32>,
    /// Seat token for the creator; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Requested id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl NewSession {
    pub fn new(mode: GameMode, creator_side: Side) -> Self {
        Self {
            mode,
            creator_side,
            engine_difficulty: None,
            token: None,
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_engine_difficulty(mut self, difficulty: u32) -> Self {
        self.engine_difficulty = Some(difficulty);
        self
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The persisted state of one game.
///
/// `status` starts `Active` and becomes terminal at most once; `outcome` is
/// set exactly when it does. Replaying `move_log` from the start position
/// reproduces `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub mode: GameMode,
    pub creator_side: Side,
    pub seats: Seats,
    pub position: String,
    pub move_log: Vec<MoveRecord>,
    pub status: GameStatus,
    pub outcome: Option<Outcome>,
    pub engine_difficulty: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh active session with the creator seated.
    pub fn new(
        session_id: SessionId,
        mode: GameMode,
        creator_side: Side,
        creator_token: String,
        start_position: String,
        engine_difficulty: Option<u32>,
    ) -> Self {
        let now = Utc::now();
        let mut seats = Seats::default();
        seats.bind(creator_side, creator_token);
        Self {
            session_id,
            mode,
            creator_side,
            seats,
            position: start_position,
            move_log: Vec::new(),
            status: GameStatus::Active,
            outcome: None,
            engine_difficulty,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// The side the engine plays, in single-player sessions.
    pub fn engine_side(&self) -> Option<Side> {
        match self.mode {
            GameMode::SinglePlayerVsEngine => Some(self.creator_side.opponent()),
            GameMode::TwoPlayer => None,
        }
    }

    /// Moves the session into the terminal status that `terminal` implies.
    /// `mover` is the side that made the final move.
    pub fn finish(&mut self, terminal: Terminal, mover: Side) {
        let (status, outcome) = match terminal {
            Terminal::Checkmate => (GameStatus::CheckmateWin, Outcome::Decisive { winner: mover }),
            Terminal::Stalemate => (GameStatus::Stalemate, Outcome::Draw),
            Terminal::Draw(_) => (GameStatus::Draw, Outcome::Draw),
        };
        self.status = status;
        self.outcome = Some(outcome);
    }

    /// Ends the session with `side` resigning.
    pub fn resign(&mut self, side: Side) {
        self.status = GameStatus::Resigned;
        self.outcome = Some(Outcome::Decisive {
            winner: side.opponent(),
        });
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Seat occupancy as shown to clients.
    pub fn seat_view(&self) -> SeatView {
        let occupant = |side| {
            if self.engine_side() == Some(side) {
                SeatOccupant::Engine
            } else if self.seats.get(side).is_some() {
                SeatOccupant::Player
            } else {
                SeatOccupant::Open
            }
        };
        SeatView {
            white: occupant(Side::White),
            black: occupant(Side::Black),
        }
    }

    /// The wire view of this session. `info` describes `self.position`.
    pub fn game_state(&self, info: &PositionInfo) -> GameState {
        GameState {
            session_id: self.session_id.clone(),
            mode: self.mode,
            position: self.position.clone(),
            seats: self.seat_view(),
            status: self.status,
            outcome: self.outcome,
            move_log: self.move_log.clone(),
            side_to_move: info.side_to_move,
            in_check: info.in_check,
            last_move: self.move_log.last().cloned(),
            waiting_for_opponent: (self.mode == GameMode::TwoPlayer)
                .then(|| !self.seats.is_full()),
            engine_difficulty: self.engine_difficulty,
        }
    }
}

//! Identity and game types shared by the wire protocol, the rules adapter,
//! and the persisted session snapshot.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Maximum length of a session id.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// A unique identifier for one game session.
///
/// Ids are opaque to the server but restricted to `[A-Za-z0-9_-]{1,64}`
/// so they can be used directly as storage keys and file names.
/// Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validates and wraps a session id.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidSessionId`] if the id is empty,
    /// longer than [`MAX_SESSION_ID_LEN`], or contains other characters.
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_SESSION_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(id))
        } else {
            Err(ProtocolError::InvalidSessionId(id))
        }
    }

    /// Generates a fresh random id (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(random_hex())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used for session ids and for seat tokens the server issues itself.
pub fn random_hex() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Game enums
// ---------------------------------------------------------------------------

/// One of the two competing sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// How a session is played. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// One human seat; the other side's moves arrive as engine moves.
    SinglePlayerVsEngine,
    /// Two human seats, each bound to a join token.
    TwoPlayer,
}

/// The lifecycle status of a session.
///
/// ```text
/// Active → { CheckmateWin, Stalemate, Resigned, Draw }
/// ```
///
/// Every non-active status is terminal and absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    CheckmateWin,
    Stalemate,
    Resigned,
    Draw,
}

impl GameStatus {
    /// Returns `true` for every status other than `Active`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::CheckmateWin => "checkmate_win",
            Self::Stalemate => "stalemate",
            Self::Resigned => "resigned",
            Self::Draw => "draw",
        };
        f.write_str(s)
    }
}

/// Final result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// One side won (by checkmate or resignation).
    Decisive { winner: Side },
    /// Nobody won (stalemate or another draw).
    Draw,
}

impl Outcome {
    /// Returns the winning side, if any.
    pub fn winner(self) -> Option<Side> {
        match self {
            Self::Decisive { winner } => Some(winner),
            Self::Draw => None,
        }
    }
}

/// Score notation: `1-0`, `0-1`, or `1/2-1/2`.
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decisive { winner: Side::White } => write!(f, "1-0"),
            Self::Decisive { winner: Side::Black } => write!(f, "0-1"),
            Self::Draw => write!(f, "1/2-1/2"),
        }
    }
}

/// One applied move in both notations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Coordinate notation, e.g. `e2e4` or `e7e8q`.
    pub compact: String,
    /// Standard algebraic notation, e.g. `e4`, `Nxf7+`, `O-O`.
    pub human: String,
}

/// Engine evaluation attached to an engine move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Evaluation {
    /// Advantage in centipawns from the engine's point of view.
    Centipawns(i32),
    /// Forced mate in N moves (negative when being mated).
    MateIn(i32),
}

// ---------------------------------------------------------------------------
// Seat occupancy (public view; tokens never go on the wire)
// ---------------------------------------------------------------------------

/// Who sits in a seat, as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatOccupant {
    Open,
    Player,
    Engine,
}

/// Occupancy of both seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub white: SeatOccupant,
    pub black: SeatOccupant,
}

impl SeatView {
    /// Returns the occupant of one side's seat.
    pub fn get(&self, side: Side) -> SeatOccupant {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

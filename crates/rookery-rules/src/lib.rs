//! Rules-engine capability for Rookery.
//!
//! The session actor never embeds chess knowledge. It asks a
//! [`RulesEngine`] two questions: "what does this position look like" and
//! "is this move legal here, and what results". Positions travel as
//! canonical strings (FEN for chess), so an engine is a pure function of
//! its inputs and a different ruleset can be swapped in without touching
//! the actor's state machine.
//!
//! [`ChessRules`] is the standard-chess adapter, backed by the `chess`
//! crate.

mod chess_rules;
mod error;

pub use chess_rules::{ChessRules, START_POSITION};
pub use error::RulesError;

use rookery_protocol::{MoveRecord, Side};

/// A move as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMove {
    /// Source square, e.g. `e2`.
    pub from: String,
    /// Destination square, e.g. `e4`.
    pub to: String,
    /// Promotion piece letter (`q`, `r`, `b`, `n`), if any.
    pub promotion: Option<char>,
}

impl CandidateMove {
    /// Builds a candidate from its parts.
    pub fn new(from: impl Into<String>, to: impl Into<String>, promotion: Option<char>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion,
        }
    }

    /// Parses coordinate notation: `e2e4`, `e7e8q`.
    ///
    /// Only the shape is checked here; square and piece validity are the
    /// engine's job.
    ///
    /// # Errors
    /// Returns [`RulesError::MalformedMove`] unless the input is 4 or 5
    /// ASCII characters.
    pub fn parse_compact(compact: &str) -> Result<Self, RulesError> {
        if !compact.is_ascii() || !(4..=5).contains(&compact.len()) {
            return Err(RulesError::MalformedMove(compact.to_string()));
        }
        Ok(Self {
            from: compact[0..2].to_string(),
            to: compact[2..4].to_string(),
            promotion: compact[4..].chars().next(),
        })
    }
}

/// Why a game ended without a winner other than stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    FiftyMoveRule,
    InsufficientMaterial,
}

/// A terminal condition reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The side to move is checkmated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Any other drawn position.
    Draw(DrawReason),
}

/// What the engine knows about a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    pub side_to_move: Side,
    pub in_check: bool,
    pub terminal: Option<Terminal>,
}

/// The result of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Normalized compact notation plus the human (SAN) form.
    pub record: MoveRecord,
    /// The side that made the move.
    pub mover: Side,
    /// Position after the move.
    pub position: String,
    /// Facts about the position after the move.
    pub info: PositionInfo,
}

/// The legality capability the session actor consumes.
///
/// Implementations hold no per-game state: everything they need is in the
/// position string they are handed.
pub trait RulesEngine: Send + Sync + 'static {
    /// The canonical starting position.
    fn start_position(&self) -> String;

    /// Describes a position.
    ///
    /// # Errors
    /// Returns [`RulesError::InvalidPosition`] if the string does not parse.
    fn inspect(&self, position: &str) -> Result<PositionInfo, RulesError>;

    /// Validates `candidate` against `position` and applies it.
    ///
    /// # Errors
    /// - [`RulesError::InvalidPosition`]: `position` does not parse
    /// - [`RulesError::MalformedMove`]: bad squares or promotion letter
    /// - [`RulesError::IllegalMove`]: well-formed but not legal here
    fn apply(&self, position: &str, candidate: &CandidateMove) -> Result<AppliedMove, RulesError>;
}

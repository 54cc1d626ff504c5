//! Error types for the rules layer.

/// Errors a [`RulesEngine`](crate::RulesEngine) can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    /// The position string could not be parsed.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The move is not well-formed (unknown square, bad promotion letter).
    #[error("malformed move: {0}")]
    MalformedMove(String),

    /// The move is well-formed but not legal in the position.
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

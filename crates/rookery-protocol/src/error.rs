//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or an
    /// unknown `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A session id that is empty, too long, or contains characters
    /// outside `[A-Za-z0-9_-]`.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// The message is invalid at the protocol level (e.g. the first
    /// message on a connection was not `attach`).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

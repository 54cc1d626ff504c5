//! Unified error type for Rookery.

use rookery_protocol::ProtocolError;
use rookery_session::{SessionError, StoreError};
use rookery_transport::TransportError;

/// Top-level error wrapping every sub-crate's error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum RookeryError {
    /// Connection-level failure (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode/decode failure or an out-of-order message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Opening a storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Binding or serving the HTTP listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! # Rookery
//!
//! Server-authoritative chess sessions for browser clients.
//!
//! Every game is owned by one session actor. Clients talk to it over a
//! real-time WebSocket channel (`attach`, then `join`/`move`/`ai_move`/
//! `resign`/`get_state`) or over a synchronous HTTP fallback with the same
//! operations. The server validates every move, persists a snapshot before
//! announcing it, and writes an append-only audit trail.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rookery::prelude::*;
//!
//! # async fn run() -> Result<(), RookeryError> {
//! rookery::init_tracing("info");
//! let server = RookeryServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(ChessRules, MemoryStore::new(), MemoryAuditLog::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod http;
mod server;

pub use error::RookeryError;
pub use server::{RookeryServer, RookeryServerBuilder, ServerConfig};

pub use rookery_protocol as protocol;
pub use rookery_rules as rules;
pub use rookery_session as session;
pub use rookery_transport as transport;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{RookeryError, RookeryServer, RookeryServerBuilder, ServerConfig};
    pub use rookery_protocol::{
        ClientMessage, GameMode, GameStatus, Outcome, ServerMessage, SessionId, Side,
    };
    pub use rookery_rules::{ChessRules, RulesEngine};
    pub use rookery_session::{
        AuditLog, FileStore, JsonlAuditLog, MemoryAuditLog, MemoryStore, NewSession,
        SessionConfig, SnapshotStore,
    };
}

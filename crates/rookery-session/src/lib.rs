//! Session actors for Rookery.
//!
//! Each game lives in its own actor task that serializes every mutation,
//! persists a snapshot before acknowledging it, mirrors moves to an audit
//! log, and fans results out to attached connections.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / handlers (above)  ← resolve ids through the SessionDirectory
//!     ↕
//! Session layer (this crate) ← actors, snapshot store, audit log, registry
//!     ↕
//! Rules engine + protocol types (below)
//! ```
//!
//! # Key types
//!
//! - [`SessionDirectory`]: id → live actor, spawning and respawning
//! - [`SessionHandle`]: send commands to one actor
//! - [`Session`]: the persisted aggregate
//! - [`SnapshotStore`] / [`AuditLog`]: storage seams

mod actor;
mod audit;
mod directory;
mod error;
mod registry;
mod session;
mod store;

pub use actor::{EngineMove, SessionHandle};
pub use audit::{AuditLog, JsonlAuditLog, MemoryAuditLog, MoveEntry, OutcomeEntry, PlayedBy};
pub use directory::SessionDirectory;
pub use error::{SessionError, StoreError};
pub use registry::{ConnectionRegistry, ConnectionSender};
pub use session::{NewSession, Seats, Session, SessionConfig};
pub use store::{FileStore, MemoryStore, SnapshotStore};

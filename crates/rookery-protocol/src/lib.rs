//! Wire protocol for Rookery.
//!
//! - **Types** ([`SessionId`], [`Side`], [`GameStatus`], ...): identifiers
//!   and game enums shared by every layer.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): what travels on
//!   the real-time channel and comes back from the HTTP fallback.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Session actor
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, Created, ErrorMessage, GameState, Joined, MoveResult, ServerMessage,
};
pub use types::{
    Evaluation, GameMode, GameStatus, MAX_SESSION_ID_LEN, MoveRecord, Outcome, SeatOccupant,
    SeatView, SessionId, Side, random_hex,
};

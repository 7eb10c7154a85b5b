//! Wire protocol for mathduel.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`Problem`], [`RoomSnapshot`], etc.):
//!   the values that travel on the wire.
//! - **Messages** ([`Command`], [`ServerEvent`]): one tagged JSON object
//!   per frame, in each direction.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the room
//! coordinator. It knows nothing about connections or rooms; it only
//! knows how messages look.
//!
//! ```text
//! Transport (bytes) → Protocol (Command / ServerEvent) → Rooms
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{Command, MAX_NAME_CHARS, ServerEvent};
pub use types::{
    Operator, PlayerId, PlayerView, Problem, RoomId, RoomSnapshot, RoomState,
    RoomView, Stats,
};

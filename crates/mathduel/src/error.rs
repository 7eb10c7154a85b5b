//! Unified error type for the mathduel server.

use mathduel_presence::PresenceError;
use mathduel_protocol::ProtocolError;
use mathduel_room::RoomError;
use mathduel_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A frame could not be handed to a player's queue.
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// A room-level error (not found, invalid state, bad name).
    #[error(transparent)]
    Room(#[from] RoomError),
}

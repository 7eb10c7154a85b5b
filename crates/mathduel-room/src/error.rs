//! Error types for the room layer.

use mathduel_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// None of these mutate state: an operation that fails leaves every room
/// exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The player is not a member of any room.
    #[error("player {0} is not in a room")]
    NoActiveRoom(PlayerId),

    /// The room is in a state that doesn't allow this operation,
    /// e.g. starting a room that is already running.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// Too few members are online to start.
    #[error("need {required} online players to start, have {online}")]
    NotEnoughPlayers { online: usize, required: usize },

    /// A display name was empty or too long after trimming.
    #[error("invalid player name: {0:?}")]
    InvalidName(String),

    /// A player id was empty or only whitespace.
    #[error("player id must not be blank")]
    BlankPlayerId,

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

//! Error types for the presence layer.

use mathduel_protocol::PlayerId;

/// Why a frame could not be handed to a player's outbound queue.
///
/// None of these are fatal; the caller logs and moves on to the next
/// recipient.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// No live connection is registered for this player (never connected,
    /// already disconnected, or a polling client).
    #[error("player {0} has no bound connection")]
    NotBound(PlayerId),

    /// The player's outbound queue is full; the frame was dropped.
    #[error("outbound queue full for player {0}")]
    QueueFull(PlayerId),

    /// The writer side is gone. The binding has been removed.
    #[error("outbound channel closed for player {0}")]
    ChannelClosed(PlayerId),
}

//! Player presence for mathduel.
//!
//! Tracks which connection currently speaks for each player and delivers
//! encoded frames to it:
//!
//! - [`PresenceRegistry`]: player id ↔ connection id ↔ outbound queue
//! - [`PresenceError`]: why a frame was not delivered
//!
//! # How it fits in the stack
//!
//! ```text
//! Room actors (above)  ← push one encoded snapshot per online member
//!     ↕
//! Presence (this crate) ← player id → bounded outbound queue
//!     ↕
//! Connection writer tasks (below) ← drain the queue into the socket
//! ```
//!
//! Identity is whatever the client presented in `register`. The registry
//! never verifies it; it only guarantees that a newer connection for the
//! same id supersedes the older one and that the older one can no longer
//! unbind it.

mod error;
mod registry;

pub use error::PresenceError;
pub use registry::{Frame, PlayerSender, PresenceRegistry, SharedPresence};

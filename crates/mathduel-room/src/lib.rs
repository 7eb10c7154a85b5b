//! Room lifecycle management for mathduel.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! record, its members, and its auto-finish deadline. The [`Coordinator`]
//! in front of them routes players, enforces one room per player, and runs
//! the heartbeat sweep.
//!
//! # Key types
//!
//! - [`Coordinator`]: every operation a connection can request
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`CoordinatorConfig`]: durations, counts, and timeouts
//! - [`RoomError`]: why an operation was refused
//!
//! # Room lifecycle
//!
//! ```text
//! waiting ──start──→ running ──60 s──→ finished
//!    ↑                  │                  │
//!    └─────restart──────┴─────restart──────┘
//! ```

mod config;
mod coordinator;
mod error;
pub mod problems;
mod room;
mod store;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, validate_name};
pub use error::RoomError;
pub use room::RoomHandle;

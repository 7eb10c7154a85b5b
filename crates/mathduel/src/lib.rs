//! # mathduel
//!
//! Room and session coordinator for a timed two-player arithmetic duel.
//!
//! Players register over a WebSocket, create or join a room by its short
//! code, start a synchronized 60-second game, and receive a `room_update`
//! snapshot whenever anything in their room changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mathduel::prelude::*;
//!
//! # async fn run() -> Result<(), DuelError> {
//! let server = DuelServer::builder()
//!     .bind("0.0.0.0:8765")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::DuelError;
pub use server::{DuelServer, DuelServerBuilder};

/// The types most applications need, in one import.
pub mod prelude {
    pub use crate::{DuelError, DuelServer, DuelServerBuilder};
    pub use mathduel_protocol::{
        Command, PlayerId, PlayerView, Problem, RoomId, RoomSnapshot,
        RoomState, ServerEvent, Stats,
    };
    pub use mathduel_room::{Coordinator, CoordinatorConfig, RoomError};
}

//! Inbound commands and outbound events.
//!
//! Both enums are internally tagged on `type` with snake_case names, so a
//! command on the wire looks like `{"type": "join_room", "room_id": "k3x9qa"}`.
//! An unknown `type` fails to decode; the server answers it with an
//! [`ServerEvent::Error`] instead of ignoring it.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoomId, RoomSnapshot, Stats};

/// Longest display name a player may choose, in characters.
pub const MAX_NAME_CHARS: usize = 12;

/// Client → server commands. One variant per operation the coordinator
/// exposes; matched exhaustively by the connection handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Must be the first frame on a connection.
    Register { player_id: PlayerId },

    CreateRoom,

    JoinRoom { room_id: RoomId },

    LeaveRoom,

    StartGame,

    /// Absolute counters, not deltas. Missing fields count as zero.
    UpdateStats {
        #[serde(default)]
        correct: u32,
        #[serde(default)]
        wrong: u32,
        #[serde(default)]
        attempted: u32,
    },

    /// Raw name as typed; trimmed and length-checked by the coordinator.
    UpdatePlayerName {
        #[serde(default)]
        name: String,
    },

    RestartGame,

    Heartbeat,

    /// Pull-style status read. Also runs the polling staleness check.
    GetRoomStatus { room_id: RoomId },
}

impl Command {
    /// Returns the counters of an `update_stats` command.
    pub fn stats(&self) -> Option<Stats> {
        match *self {
            Self::UpdateStats {
                correct,
                wrong,
                attempted,
            } => Some(Stats {
                correct,
                wrong,
                attempted,
            }),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::CreateRoom => "create_room",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom => "leave_room",
            Self::StartGame => "start_game",
            Self::UpdateStats { .. } => "update_stats",
            Self::UpdatePlayerName { .. } => "update_player_name",
            Self::RestartGame => "restart_game",
            Self::Heartbeat => "heartbeat",
            Self::GetRoomStatus { .. } => "get_room_status",
        }
    }
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Registered { player_id: PlayerId },

    RoomCreated { room_id: RoomId },

    JoinResult {
        success: bool,
        room_id: Option<RoomId>,
    },

    LeaveResult { success: bool },

    StartResult { success: bool },

    StatsResult { success: bool },

    /// `name` is the stored (trimmed) name on success.
    NameResult {
        success: bool,
        name: Option<String>,
    },

    RestartResult { success: bool },

    /// `server_time` is the refreshed `last_seen`, in unix millis.
    HeartbeatAck { server_time: u64 },

    RoomStatus {
        success: bool,
        data: Option<RoomSnapshot>,
    },

    /// Pushed to every online member whenever a room changes. The snapshot
    /// fields sit next to the tag: `{"type": "room_update", "room": ..., "players": [...]}`.
    RoomUpdate(RoomSnapshot),

    /// `code` follows HTTP conventions (400 malformed, 409 conflict).
    Error { code: u16, message: String },
}

//! Core wire types: identities, problems, and room snapshots.
//!
//! Everything here is serialized to JSON and read by the browser client,
//! so field names are part of the contract. A `room_update` event is just a
//! [`RoomSnapshot`] with a `type` tag in front of it.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Caller-supplied, opaque player identifier.
///
/// The server never generates or verifies these. The client picks one
/// (usually random) and presents it in its `register` command; two live
/// clients using the same id will supersede each other's connection.
///
/// `#[serde(transparent)]` keeps the JSON form a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wraps anything string-like as a player id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty or only whitespace. Such ids are
    /// refused at registration.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Short, human-typable room code (e.g. `"k3x9qa"`).
///
/// Players read these aloud and type them on phones, so lookups go through
/// [`RoomId::normalized`] to forgive stray whitespace and capitals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Wraps anything string-like as a room id, unmodified.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the code trimmed and ASCII-lowercased.
    pub fn normalized(&self) -> Self {
        Self(self.0.trim().to_ascii_lowercase())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Problems
// ---------------------------------------------------------------------------

/// Arithmetic operator of a [`Problem`]. Serialized as the symbol itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
}

impl Operator {
    /// Applies the operator.
    pub fn apply(self, a: i32, b: i32) -> i32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("+"),
            Self::Sub => f.write_str("-"),
        }
    }
}

/// One generated question. Immutable once generated; every player in a
/// room sees the same sequence in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub a: i32,
    pub b: i32,
    pub op: Operator,
    pub answer: i32,
}

impl Problem {
    /// Builds a problem, computing the answer from the operands.
    pub fn new(a: i32, op: Operator, b: i32) -> Self {
        Self {
            a,
            b,
            op,
            answer: op.apply(a, b),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} = {}", self.a, self.op, self.b, self.answer)
    }
}

// ---------------------------------------------------------------------------
// Room state and snapshots
// ---------------------------------------------------------------------------

/// Lifecycle state of a room.
///
/// ```text
/// waiting ──start──→ running ──timer──→ finished
///    ↑                  │                  │
///    └─────restart──────┴─────restart──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    #[default]
    Waiting,
    Running,
    Finished,
}

impl RoomState {
    /// Returns `true` while a room carries a problem set.
    pub fn has_problems(self) -> bool {
        matches!(self, Self::Running | Self::Finished)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Running => f.write_str("running"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

/// Per-player answer counters reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub wrong: u32,
    #[serde(default)]
    pub attempted: u32,
}

/// Room fields as they appear in a snapshot. Timestamps are unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: RoomId,
    pub state: RoomState,
    pub created_at: u64,
    /// Game length in seconds.
    pub duration: u64,
    pub problem_count: usize,
    pub problems: Vec<Problem>,
    pub start_ts: Option<u64>,
    pub finished_at: Option<u64>,
}

/// Player fields as they appear in a snapshot.
///
/// `last_seen` is unix millis, or `0` once the player has been marked
/// offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub last_seen: u64,
    pub online: bool,
    #[serde(flatten)]
    pub stats: Stats,
}

/// The full state of one room at one instant. The unit of broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomView,
    /// Members in join order.
    pub players: Vec<PlayerView>,
}

impl RoomSnapshot {
    /// Looks up one member by id.
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Number of members currently marked online.
    pub fn online_count(&self) -> usize {
        self.players.iter().filter(|p| p.online).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RoomSnapshot {
        RoomSnapshot {
            room: RoomView {
                id: RoomId::from("abc123"),
                state: RoomState::Running,
                created_at: 1_000,
                duration: 60,
                problem_count: 1,
                problems: vec![Problem::new(42, Operator::Sub, 17)],
                start_ts: Some(2_000),
                finished_at: None,
            },
            players: vec![
                PlayerView {
                    id: PlayerId::from("p1"),
                    name: "Pp1".into(),
                    last_seen: 2_000,
                    online: true,
                    stats: Stats { correct: 3, wrong: 1, attempted: 4 },
                },
                PlayerView {
                    id: PlayerId::from("p2"),
                    name: "Pp2".into(),
                    last_seen: 0,
                    online: false,
                    stats: Stats::default(),
                },
            ],
        }
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        assert_eq!(serde_json::to_string(&PlayerId::from("p1")).unwrap(), "\"p1\"");
        assert_eq!(serde_json::to_string(&RoomId::from("r1")).unwrap(), "\"r1\"");
    }

    #[test]
    fn test_room_id_normalized_trims_and_lowercases() {
        assert_eq!(RoomId::from("  AbC12 ").normalized(), RoomId::from("abc12"));
    }

    #[test]
    fn test_player_id_blank_detection() {
        assert!(PlayerId::from("").is_blank());
        assert!(PlayerId::from("   ").is_blank());
        assert!(!PlayerId::from("p").is_blank());
    }

    #[test]
    fn test_operator_serializes_as_symbol() {
        assert_eq!(serde_json::to_string(&Operator::Add).unwrap(), "\"+\"");
        assert_eq!(serde_json::to_string(&Operator::Sub).unwrap(), "\"-\"");
    }

    #[test]
    fn test_problem_new_computes_answer() {
        assert_eq!(Problem::new(42, Operator::Sub, 17).answer, 25);
        assert_eq!(Problem::new(42, Operator::Add, 17).answer, 59);
        assert_eq!(Problem::new(42, Operator::Add, 17).to_string(), "42 + 17 = 59");
    }

    #[test]
    fn test_room_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RoomState::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(RoomState::Finished.to_string(), "finished");
    }

    #[test]
    fn test_room_state_has_problems() {
        assert!(!RoomState::Waiting.has_problems());
        assert!(RoomState::Running.has_problems());
        assert!(RoomState::Finished.has_problems());
    }

    #[test]
    fn test_player_view_flattens_stats() {
        let json = serde_json::to_value(&snapshot().players[0]).unwrap();
        assert_eq!(json["correct"], 3);
        assert_eq!(json["wrong"], 1);
        assert_eq!(json["attempted"], 4);
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["room"]["id"], "abc123");
        assert_eq!(json["room"]["state"], "running");
        assert_eq!(json["room"]["problems"][0]["op"], "-");
        assert_eq!(json["room"]["problems"][0]["answer"], 25);
        assert!(json["room"]["finished_at"].is_null());
        assert_eq!(json["players"][1]["id"], "p2");
        assert_eq!(json["players"][1]["last_seen"], 0);
    }

    #[test]
    fn test_snapshot_helpers() {
        let snap = snapshot();
        assert_eq!(snap.online_count(), 1);
        assert_eq!(snap.player(&PlayerId::from("p2")).unwrap().name, "Pp2");
        assert!(snap.player(&PlayerId::from("nobody")).is_none());
    }
}

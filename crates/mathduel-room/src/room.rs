//! Room actor: an isolated Tokio task that owns one room.
//!
//! The actor is the single writer for its room record, its member list,
//! and its auto-finish [`Deadline`]. Everything else talks to it through a
//! [`RoomHandle`]. After each mutation the actor encodes one snapshot and
//! pushes it to every online member through the presence registry.

use std::time::Duration;

use mathduel_presence::{Frame, PresenceError, SharedPresence};
use mathduel_protocol::{
    Codec, JsonCodec, MAX_NAME_CHARS, PlayerId, PlayerView, Problem, RoomId,
    RoomSnapshot, RoomState, RoomView, ServerEvent, Stats,
};
use mathduel_timer::{Deadline, as_millis, unix_millis};
use tokio::sync::{mpsc, oneshot};

use crate::{CoordinatorConfig, RoomError, problems};

/// Default display name for a new member: `P<id>`, cut to the name limit.
pub(crate) fn default_name(player_id: &PlayerId) -> String {
    format!("P{player_id}").chars().take(MAX_NAME_CHARS).collect()
}

/// Commands sent to a room actor through its channel.
///
/// Most variants carry a `oneshot::Sender` reply channel; the caller
/// awaits the answer on it.
pub(crate) enum RoomCommand {
    /// Add a member, or refresh an existing one in place.
    Join {
        player_id: PlayerId,
        reply: oneshot::Sender<()>,
    },

    /// Remove a member. `notify = false` detaches silently (the player
    /// moved to another room).
    Leave {
        player_id: PlayerId,
        notify: bool,
        reply: oneshot::Sender<bool>,
    },

    Start {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Finish a running game now. Replies whether the state changed.
    Finish {
        reply: oneshot::Sender<bool>,
    },

    Restart {
        reply: oneshot::Sender<()>,
    },

    UpdateStats {
        player_id: PlayerId,
        stats: Stats,
        reply: oneshot::Sender<bool>,
    },

    /// `name` is already validated.
    Rename {
        player_id: PlayerId,
        name: String,
        reply: oneshot::Sender<bool>,
    },

    /// Heartbeat: refresh `last_seen`. Replies with the new value, or
    /// `None` if the player is not a member.
    Touch {
        player_id: PlayerId,
        reply: oneshot::Sender<Option<u64>>,
    },

    /// The member's connection registered.
    SetOnline {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },

    /// The member's connection went away.
    SetOffline {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },

    /// Mark members silent for longer than `timeout` offline. Replies
    /// with how many went offline.
    Sweep {
        timeout: Duration,
        reply: oneshot::Sender<usize>,
    },

    /// Read the current snapshot, optionally sweeping first.
    Snapshot {
        sweep_timeout: Option<Duration>,
        reply: oneshot::Sender<RoomSnapshot>,
    },

    /// Push the current snapshot to every online member.
    Broadcast {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: it's just an `mpsc::Sender` wrapper. The room store
/// holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Sends a command and waits for its reply.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    pub(crate) async fn join(&self, player_id: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join { player_id, reply })
            .await
    }

    pub(crate) async fn leave(
        &self,
        player_id: PlayerId,
        notify: bool,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Leave {
            player_id,
            notify,
            reply,
        })
        .await
    }

    pub(crate) async fn start(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Start { reply }).await?
    }

    pub(crate) async fn finish(&self) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Finish { reply }).await
    }

    pub(crate) async fn restart(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Restart { reply }).await
    }

    pub(crate) async fn update_stats(
        &self,
        player_id: PlayerId,
        stats: Stats,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::UpdateStats {
            player_id,
            stats,
            reply,
        })
        .await
    }

    pub(crate) async fn rename(
        &self,
        player_id: PlayerId,
        name: String,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Rename {
            player_id,
            name,
            reply,
        })
        .await
    }

    pub(crate) async fn touch(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<u64>, RoomError> {
        self.request(|reply| RoomCommand::Touch { player_id, reply })
            .await
    }

    pub(crate) async fn set_online(
        &self,
        player_id: PlayerId,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::SetOnline { player_id, reply })
            .await
    }

    pub(crate) async fn set_offline(
        &self,
        player_id: PlayerId,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::SetOffline { player_id, reply })
            .await
    }

    pub(crate) async fn sweep(&self, timeout: Duration) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Sweep { timeout, reply })
            .await
    }

    /// Reads the current snapshot. With `sweep_timeout`, stale members are
    /// marked offline (and broadcast) first.
    pub async fn snapshot(
        &self,
        sweep_timeout: Option<Duration>,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot {
            sweep_timeout,
            reply,
        })
        .await
    }

    pub(crate) async fn broadcast(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Broadcast { reply }).await
    }
}

/// One member of a room.
#[derive(Debug, Clone)]
struct Member {
    id: PlayerId,
    name: String,
    last_seen: u64,
    online: bool,
    stats: Stats,
}

impl Member {
    fn new(id: PlayerId, now: u64) -> Self {
        Self {
            name: default_name(&id),
            id,
            last_seen: now,
            online: true,
            stats: Stats::default(),
        }
    }

    fn mark_offline(&mut self) {
        self.online = false;
        self.last_seen = 0;
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            last_seen: self.last_seen,
            online: self.online,
            stats: self.stats,
        }
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    config: CoordinatorConfig,
    state: RoomState,
    created_at: u64,
    problems: Vec<Problem>,
    start_ts: Option<u64>,
    finished_at: Option<u64>,
    /// Join order.
    members: Vec<Member>,
    auto_finish: Deadline,
    presence: SharedPresence,
    codec: JsonCodec,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until every handle is dropped.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                () = self.auto_finish.wait() => {
                    tracing::debug!(room_id = %self.room_id, "auto-finish deadline fired");
                    self.finish().await;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { player_id, reply } => {
                self.handle_join(player_id);
                self.broadcast().await;
                let _ = reply.send(());
            }
            RoomCommand::Leave {
                player_id,
                notify,
                reply,
            } => {
                let removed = self.handle_leave(&player_id);
                if removed && notify {
                    self.broadcast().await;
                }
                let _ = reply.send(removed);
            }
            RoomCommand::Start { reply } => {
                let result = self.handle_start();
                if result.is_ok() {
                    self.broadcast().await;
                }
                let _ = reply.send(result);
            }
            RoomCommand::Finish { reply } => {
                let finished = self.finish().await;
                let _ = reply.send(finished);
            }
            RoomCommand::Restart { reply } => {
                self.handle_restart();
                self.broadcast().await;
                let _ = reply.send(());
            }
            RoomCommand::UpdateStats {
                player_id,
                stats,
                reply,
            } => {
                let now = unix_millis();
                let found = self
                    .member_mut(&player_id)
                    .map(|m| {
                        m.stats = stats;
                        m.last_seen = now;
                    })
                    .is_some();
                if found {
                    tracing::debug!(room_id = %self.room_id, %player_id, ?stats, "stats updated");
                    self.broadcast().await;
                }
                let _ = reply.send(found);
            }
            RoomCommand::Rename {
                player_id,
                name,
                reply,
            } => {
                let now = unix_millis();
                let room_id = self.room_id.clone();
                let found = self
                    .member_mut(&player_id)
                    .map(|m| {
                        tracing::info!(%room_id, %player_id, old = %m.name, new = %name, "player renamed");
                        m.name = name;
                        m.last_seen = now;
                    })
                    .is_some();
                if found {
                    self.broadcast().await;
                }
                let _ = reply.send(found);
            }
            RoomCommand::Touch { player_id, reply } => {
                let now = unix_millis();
                let seen = self.member_mut(&player_id).map(|m| {
                    m.last_seen = now;
                    now
                });
                let _ = reply.send(seen);
            }
            RoomCommand::SetOnline { player_id, reply } => {
                let now = unix_millis();
                let found = self
                    .member_mut(&player_id)
                    .map(|m| {
                        m.online = true;
                        m.last_seen = now;
                    })
                    .is_some();
                if found {
                    tracing::debug!(room_id = %self.room_id, %player_id, "member online");
                    self.broadcast().await;
                }
                let _ = reply.send(found);
            }
            RoomCommand::SetOffline { player_id, reply } => {
                let found = self
                    .member_mut(&player_id)
                    .map(Member::mark_offline)
                    .is_some();
                if found {
                    tracing::debug!(room_id = %self.room_id, %player_id, "member offline");
                    self.broadcast().await;
                }
                let _ = reply.send(found);
            }
            RoomCommand::Sweep { timeout, reply } => {
                let stale = self.sweep_and_broadcast(timeout).await;
                let _ = reply.send(stale);
            }
            RoomCommand::Snapshot {
                sweep_timeout,
                reply,
            } => {
                if let Some(timeout) = sweep_timeout {
                    self.sweep_and_broadcast(timeout).await;
                }
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Broadcast { reply } => {
                self.broadcast().await;
                let _ = reply.send(());
            }
        }
    }

    fn member_mut(&mut self, player_id: &PlayerId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.id == player_id)
    }

    fn handle_join(&mut self, player_id: PlayerId) {
        let now = unix_millis();
        match self.member_mut(&player_id) {
            // Re-join keeps position and name.
            Some(member) => {
                member.stats = Stats::default();
                member.online = true;
                member.last_seen = now;
            }
            None => self.members.push(Member::new(player_id.clone(), now)),
        }
        tracing::info!(
            room_id = %self.room_id,
            %player_id,
            players = self.members.len(),
            "player joined"
        );
    }

    fn handle_leave(&mut self, player_id: &PlayerId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| &m.id != player_id);
        let removed = self.members.len() != before;
        if removed {
            tracing::info!(
                room_id = %self.room_id,
                %player_id,
                players = self.members.len(),
                "player left"
            );
        }
        removed
    }

    fn handle_start(&mut self) -> Result<(), RoomError> {
        if self.state != RoomState::Waiting {
            tracing::warn!(room_id = %self.room_id, state = %self.state, "start rejected: room not waiting");
            return Err(RoomError::InvalidState(format!(
                "cannot start room in state {}",
                self.state
            )));
        }
        let online = self.members.iter().filter(|m| m.online).count();
        let required = self.config.min_players_to_start;
        if online < required {
            tracing::warn!(room_id = %self.room_id, online, required, "start rejected: not enough online players");
            return Err(RoomError::NotEnoughPlayers { online, required });
        }

        self.problems = problems::generate_default(self.config.problem_count);
        self.state = RoomState::Running;
        self.start_ts = Some(unix_millis());
        self.finished_at = None;
        for member in &mut self.members {
            member.stats = Stats::default();
        }
        self.auto_finish.arm(self.config.room_duration);

        tracing::info!(
            room_id = %self.room_id,
            players = self.members.len(),
            problems = self.problems.len(),
            duration_s = self.config.room_duration.as_secs(),
            "game started"
        );
        Ok(())
    }

    /// Running → finished. Anything else is left alone.
    async fn finish(&mut self) -> bool {
        if self.state != RoomState::Running {
            tracing::debug!(room_id = %self.room_id, state = %self.state, "finish ignored: room not running");
            return false;
        }
        self.auto_finish.disarm();
        self.state = RoomState::Finished;
        self.finished_at = Some(unix_millis());
        tracing::info!(room_id = %self.room_id, "game finished");
        self.broadcast().await;
        true
    }

    fn handle_restart(&mut self) {
        let now = unix_millis();
        self.auto_finish.disarm();
        self.state = RoomState::Waiting;
        self.problems.clear();
        self.start_ts = None;
        self.finished_at = None;
        for member in &mut self.members {
            member.stats = Stats::default();
            if member.online {
                member.last_seen = now;
            }
        }
        tracing::info!(room_id = %self.room_id, "game reset to waiting");
    }

    /// Marks stale online members offline. Returns how many changed.
    fn sweep(&mut self, timeout: Duration) -> usize {
        let now = unix_millis();
        let timeout_ms = as_millis(timeout);
        let mut stale = 0;
        for member in &mut self.members {
            if member.online && now.saturating_sub(member.last_seen) > timeout_ms {
                tracing::info!(
                    room_id = %self.room_id,
                    player_id = %member.id,
                    silent_ms = now.saturating_sub(member.last_seen),
                    "player timed out"
                );
                member.mark_offline();
                stale += 1;
            }
        }
        stale
    }

    /// Sweeps and, if anyone went offline, broadcasts once.
    async fn sweep_and_broadcast(&mut self, timeout: Duration) -> usize {
        let stale = self.sweep(timeout);
        if stale > 0 {
            self.broadcast().await;
        }
        stale
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: RoomView {
                id: self.room_id.clone(),
                state: self.state,
                created_at: self.created_at,
                duration: self.config.room_duration.as_secs(),
                problem_count: self.config.problem_count,
                problems: self.problems.clone(),
                start_ts: self.start_ts,
                finished_at: self.finished_at,
            },
            players: self.members.iter().map(Member::view).collect(),
        }
    }

    /// Pushes the current snapshot to every online member.
    ///
    /// A member whose channel turns out to be closed goes offline, and the
    /// remaining members get a fresh snapshot showing it. Each pass takes
    /// at least one member offline, so this ends after at most one pass
    /// per member.
    async fn broadcast(&mut self) {
        loop {
            let closed = self.send_snapshot().await;
            if closed.is_empty() {
                return;
            }
            for player_id in &closed {
                if let Some(member) = self.member_mut(player_id) {
                    member.mark_offline();
                }
            }
        }
    }

    /// Encodes the snapshot once and hands it to each online member's
    /// queue. Returns the members whose channel was closed.
    async fn send_snapshot(&self) -> Vec<PlayerId> {
        let event = ServerEvent::RoomUpdate(self.snapshot());
        let frame = match self.codec.encode(&event) {
            Ok(bytes) => Frame::from(bytes),
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "failed to encode room update");
                return Vec::new();
            }
        };

        let mut sent = 0usize;
        let mut closed = Vec::new();
        {
            let mut presence = self.presence.lock().await;
            for member in self.members.iter().filter(|m| m.online) {
                match presence.send(&member.id, frame.clone()) {
                    Ok(()) => sent += 1,
                    Err(PresenceError::NotBound(player_id)) => {
                        tracing::debug!(room_id = %self.room_id, %player_id, "no live channel, skipping");
                    }
                    Err(PresenceError::QueueFull(player_id)) => {
                        tracing::warn!(room_id = %self.room_id, %player_id, "outbound queue full, dropping room update");
                    }
                    Err(PresenceError::ChannelClosed(player_id)) => {
                        tracing::warn!(room_id = %self.room_id, %player_id, "outbound channel closed, marking offline");
                        closed.push(player_id);
                    }
                }
            }
        }

        tracing::debug!(
            room_id = %self.room_id,
            state = %self.state,
            players = self.members.len(),
            sent,
            "room update broadcast"
        );
        closed
    }
}

/// Spawns a room actor with `creator` as its only member and returns a
/// handle to it.
///
/// The actor does not broadcast on creation; the caller does that after
/// replying to the creator.
pub(crate) fn spawn_room(
    room_id: RoomId,
    creator: PlayerId,
    config: CoordinatorConfig,
    presence: SharedPresence,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let now = unix_millis();

    let actor = RoomActor {
        room_id: room_id.clone(),
        config,
        state: RoomState::Waiting,
        created_at: now,
        problems: Vec::new(),
        start_ts: None,
        finished_at: None,
        members: vec![Member::new(creator, now)],
        auto_finish: Deadline::new(),
        presence,
        codec: JsonCodec,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_prefixes_id() {
        assert_eq!(default_name(&PlayerId::from("42")), "P42");
    }

    #[test]
    fn test_default_name_truncated_to_limit() {
        let name = default_name(&PlayerId::from("abcdefghijklmnop"));
        assert_eq!(name, "Pabcdefghijk");
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_member_mark_offline_uses_sentinel() {
        let mut m = Member::new(PlayerId::from("a"), 1_000);
        assert!(m.online);
        m.mark_offline();
        assert!(!m.online);
        assert_eq!(m.last_seen, 0);
    }

    #[tokio::test]
    async fn test_handle_to_stopped_actor_is_unavailable() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = RoomHandle {
            room_id: RoomId::from("gone00"),
            sender,
        };

        let err = handle.finish().await.unwrap_err();
        assert!(matches!(err, RoomError::Unavailable(ref id) if id.as_str() == "gone00"));
    }
}

//! The coordinator: every room operation a connection handler can ask for.
//!
//! Owns the room store (behind one lock) and shares the presence registry
//! with the room actors. Lock order:
//!
//! 1. the store lock may be held while awaiting a room actor;
//! 2. room actors only ever take the presence lock;
//! 3. nothing holding the presence lock awaits anything else.

use std::sync::Arc;

use mathduel_presence::{PlayerSender, PresenceRegistry, SharedPresence};
use mathduel_protocol::{MAX_NAME_CHARS, PlayerId, RoomId, RoomSnapshot, Stats};
use mathduel_timer::{SweepScheduler, as_millis, unix_millis};
use mathduel_transport::ConnectionId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::RoomStore;
use crate::{CoordinatorConfig, RoomError};

/// Trims a requested display name and checks it is 1 to
/// [`MAX_NAME_CHARS`] characters long.
pub fn validate_name(raw: &str) -> Result<String, RoomError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(RoomError::InvalidName(name.to_owned()));
    }
    Ok(name.to_owned())
}

/// Coordinates rooms, presence, and the heartbeat sweep.
///
/// Shared as `Arc<Coordinator>` between all connection tasks and the
/// heartbeat monitor.
pub struct Coordinator {
    config: CoordinatorConfig,
    store: Mutex<RoomStore>,
    presence: SharedPresence,
}

impl Coordinator {
    /// Creates a coordinator with an empty presence registry.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_presence(config, PresenceRegistry::shared())
    }

    /// Creates a coordinator around an existing presence registry.
    pub fn with_presence(config: CoordinatorConfig, presence: SharedPresence) -> Self {
        Self {
            config: config.validated(),
            store: Mutex::new(RoomStore::new()),
            presence,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The shared presence registry.
    pub fn presence(&self) -> &SharedPresence {
        &self.presence
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Binds a player to a connection's outbound queue.
    ///
    /// If the player is already in a room they come back online there and
    /// the room is broadcast. Returns the superseded connection, if any.
    pub async fn register(
        &self,
        player_id: PlayerId,
        conn: ConnectionId,
        sender: PlayerSender,
    ) -> Result<Option<ConnectionId>, RoomError> {
        if player_id.is_blank() {
            return Err(RoomError::BlankPlayerId);
        }

        let superseded = self
            .presence
            .lock()
            .await
            .register(player_id.clone(), conn, sender);
        info!(%player_id, %conn, "player registered");

        let handle = self.store.lock().await.room_of(&player_id).ok();
        if let Some(handle) = handle {
            handle.set_online(player_id).await?;
        }
        Ok(superseded)
    }

    /// Releases the binding `conn` owns, if it still owns one.
    ///
    /// The player goes offline in their room and the room is broadcast.
    /// A connection that was already superseded changes nothing.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<PlayerId> {
        let player_id = self.presence.lock().await.unregister(conn)?;
        info!(%player_id, %conn, "player unregistered");

        let handle = self.store.lock().await.room_of(&player_id).ok();
        if let Some(handle) = handle {
            if let Err(e) = handle.set_offline(player_id.clone()).await {
                warn!(%player_id, error = %e, "failed to mark player offline");
            }
        }
        Some(player_id)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Creates a room with `creator` as its only member.
    ///
    /// Does not broadcast: the caller replies to the creator first and
    /// then calls [`broadcast`](Self::broadcast).
    pub async fn create_room(&self, creator: PlayerId) -> RoomId {
        self.store
            .lock()
            .await
            .create_room(creator, &self.config, &self.presence)
            .await
    }

    /// Moves a player into a room and broadcasts it. Returns the
    /// normalized room id.
    pub async fn join_room(
        &self,
        player_id: PlayerId,
        room_id: &RoomId,
    ) -> Result<RoomId, RoomError> {
        let result = self.store.lock().await.join_room(player_id.clone(), room_id).await;
        if let Err(e) = &result {
            debug!(%player_id, %room_id, error = %e, "join rejected");
        }
        result
    }

    /// Removes a player from their room and broadcasts to it.
    pub async fn leave_room(&self, player_id: &PlayerId) -> Result<RoomId, RoomError> {
        self.store.lock().await.leave_room(player_id).await
    }

    /// The room a player is currently in.
    pub async fn player_room(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.store.lock().await.player_room(player_id)
    }

    /// Number of rooms ever created (rooms live until process exit).
    pub async fn room_count(&self) -> usize {
        self.store.lock().await.room_count()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts the game in the player's room.
    ///
    /// # Errors
    /// [`RoomError::NoActiveRoom`], [`RoomError::InvalidState`] if the room
    /// is not waiting, or [`RoomError::NotEnoughPlayers`].
    pub async fn start_game(&self, player_id: &PlayerId) -> Result<(), RoomError> {
        let handle = self.store.lock().await.room_of(player_id)?;
        handle.start().await
    }

    /// Resets the player's room to waiting, from any state.
    pub async fn restart_game(&self, player_id: &PlayerId) -> Result<(), RoomError> {
        let handle = self.store.lock().await.room_of(player_id)?;
        handle.restart().await
    }

    /// Finishes a running room now. Returns `false` (and changes nothing)
    /// if the room is unknown or not running.
    pub async fn finish(&self, room_id: &RoomId) -> bool {
        let Some(handle) = self.store.lock().await.get(room_id) else {
            debug!(%room_id, "finish ignored: unknown room");
            return false;
        };
        match handle.finish().await {
            Ok(finished) => finished,
            Err(e) => {
                warn!(%room_id, error = %e, "finish failed");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Player updates
    // -----------------------------------------------------------------------

    /// Replaces the player's counters and broadcasts.
    pub async fn update_stats(&self, player_id: &PlayerId, stats: Stats) -> Result<(), RoomError> {
        let handle = self.store.lock().await.room_of(player_id)?;
        if handle.update_stats(player_id.clone(), stats).await? {
            Ok(())
        } else {
            Err(RoomError::NoActiveRoom(player_id.clone()))
        }
    }

    /// Validates and stores a new display name, then broadcasts. Returns
    /// the stored (trimmed) name.
    pub async fn update_player_name(
        &self,
        player_id: &PlayerId,
        raw: &str,
    ) -> Result<String, RoomError> {
        let name = validate_name(raw).inspect_err(|_| {
            warn!(%player_id, name = raw, "invalid player name");
        })?;
        let handle = self.store.lock().await.room_of(player_id)?;
        if handle.rename(player_id.clone(), name.clone()).await? {
            Ok(name)
        } else {
            Err(RoomError::NoActiveRoom(player_id.clone()))
        }
    }

    /// Refreshes the player's `last_seen` and returns it. A player with
    /// no room still gets the current time back.
    pub async fn heartbeat(&self, player_id: &PlayerId) -> u64 {
        let handle = self.store.lock().await.room_of(player_id).ok();
        if let Some(handle) = handle {
            if let Ok(Some(seen)) = handle.touch(player_id.clone()).await {
                return seen;
            }
        }
        unix_millis()
    }

    // -----------------------------------------------------------------------
    // Broadcast and status
    // -----------------------------------------------------------------------

    /// Pushes the room's current snapshot to its online members.
    pub async fn broadcast(&self, room_id: &RoomId) {
        let Some(handle) = self.store.lock().await.get(room_id) else {
            warn!(%room_id, "broadcast requested for unknown room");
            return;
        };
        if let Err(e) = handle.broadcast().await {
            warn!(%room_id, error = %e, "broadcast failed");
        }
    }

    /// Pull-style status read for polling clients.
    ///
    /// Members silent for longer than `poll_timeout` are marked offline
    /// (and broadcast) before the snapshot is taken.
    pub async fn room_status(&self, room_id: &RoomId) -> Result<RoomSnapshot, RoomError> {
        let handle = self
            .store
            .lock()
            .await
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.snapshot(Some(self.config.poll_timeout)).await
    }

    /// The room's current snapshot, without any staleness check.
    pub async fn snapshot(&self, room_id: &RoomId) -> Result<RoomSnapshot, RoomError> {
        let handle = self
            .store
            .lock()
            .await
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        handle.snapshot(None).await
    }

    // -----------------------------------------------------------------------
    // Heartbeat monitor
    // -----------------------------------------------------------------------

    /// Runs one staleness sweep over every room with the channel timeout.
    /// Returns how many members went offline.
    pub async fn sweep(&self) -> usize {
        let handles = self.store.lock().await.handles();
        let mut stale = 0;
        for handle in handles {
            match handle.sweep(self.config.channel_timeout).await {
                Ok(n) => stale += n,
                Err(e) => warn!(room_id = %handle.room_id(), error = %e, "sweep failed"),
            }
        }
        stale
    }

    /// Spawns the periodic sweep task.
    pub fn spawn_heartbeat_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut scheduler = SweepScheduler::new(self.config.sweep_config());
        tokio::spawn(async move {
            info!(
                period_ms = as_millis(scheduler.period()),
                timeout_ms = as_millis(coordinator.config.channel_timeout),
                "heartbeat monitor started"
            );
            loop {
                let tick = scheduler.tick().await;
                let stale = coordinator.sweep().await;
                if stale > 0 {
                    info!(sweep = tick.sweep, stale, "heartbeat sweep marked players offline");
                } else {
                    debug!(sweep = tick.sweep, "heartbeat sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  Alice ").unwrap(), "Alice");
    }

    #[test]
    fn test_validate_name_rejects_empty_and_blank() {
        assert!(matches!(validate_name(""), Err(RoomError::InvalidName(_))));
        assert!(matches!(validate_name("   "), Err(RoomError::InvalidName(_))));
    }

    #[test]
    fn test_validate_name_length_limit_counts_chars() {
        assert!(validate_name("abcdefghijkl").is_ok());
        assert!(validate_name("abcdefghijklm").is_err());
        // Multi-byte characters count once each.
        assert!(validate_name(&"é".repeat(12)).is_ok());
        assert!(validate_name(&"é".repeat(13)).is_err());
    }
}

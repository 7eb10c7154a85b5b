//! The presence registry: who is reachable, and through which connection.
//!
//! # Concurrency note
//!
//! `PresenceRegistry` itself is a plain pair of `HashMap`s. It is shared
//! as [`SharedPresence`] and every method is synchronous, so the lock is
//! never held across an `.await`. Delivery uses `try_send` and never
//! waits on a slow client.

use std::collections::HashMap;
use std::sync::Arc;

use mathduel_protocol::PlayerId;
use mathduel_transport::ConnectionId;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::PresenceError;

/// One encoded outbound message. Shared so a broadcast encodes once and
/// hands the same buffer to every recipient.
pub type Frame = Arc<[u8]>;

/// Sending half of a player's bounded outbound queue.
pub type PlayerSender = mpsc::Sender<Frame>;

/// The registry as shared between the server and room actors.
pub type SharedPresence = Arc<Mutex<PresenceRegistry>>;

struct Binding {
    conn: ConnectionId,
    sender: PlayerSender,
}

/// Maps each player id to its current connection and outbound queue.
///
/// A reverse index from connection id to player id makes
/// [`unregister`](Self::unregister) exact: only the connection that owns
/// the current binding can remove it.
#[derive(Default)]
pub struct PresenceRegistry {
    bindings: HashMap<PlayerId, Binding>,
    owners: HashMap<ConnectionId, PlayerId>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry wrapped for sharing.
    pub fn shared() -> SharedPresence {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Binds `player_id` to `conn`, replacing any earlier binding.
    ///
    /// Returns the connection that was superseded, if a different one was
    /// bound. If `conn` previously spoke for another player id, that
    /// binding is released too.
    pub fn register(
        &mut self,
        player_id: PlayerId,
        conn: ConnectionId,
        sender: PlayerSender,
    ) -> Option<ConnectionId> {
        if let Some(previous_id) = self.owners.remove(&conn) {
            if previous_id != player_id {
                self.bindings.remove(&previous_id);
                debug!(%conn, player_id = %previous_id, "connection re-registered under a new id");
            }
        }

        let superseded = self
            .bindings
            .insert(player_id.clone(), Binding { conn, sender })
            .map(|old| old.conn)
            .filter(|old| *old != conn);

        if let Some(old) = superseded {
            self.owners.remove(&old);
            info!(%player_id, %old, new = %conn, "player reconnected, superseding old connection");
        }
        self.owners.insert(conn, player_id);
        superseded
    }

    /// Releases whatever binding `conn` owns.
    ///
    /// Returns the player id that went unbound, or `None` if this
    /// connection never registered or has already been superseded.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<PlayerId> {
        let player_id = self.owners.remove(&conn)?;
        self.bindings.remove(&player_id);
        debug!(%conn, %player_id, "presence binding released");
        Some(player_id)
    }

    /// Pushes a frame into the player's outbound queue without waiting.
    ///
    /// On [`PresenceError::ChannelClosed`] the binding is removed before
    /// returning, so later sends report [`PresenceError::NotBound`].
    pub fn send(
        &mut self,
        player_id: &PlayerId,
        frame: Frame,
    ) -> Result<(), PresenceError> {
        let binding = self
            .bindings
            .get(player_id)
            .ok_or_else(|| PresenceError::NotBound(player_id.clone()))?;

        match binding.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PresenceError::QueueFull(player_id.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                if let Some(binding) = self.bindings.remove(player_id) {
                    self.owners.remove(&binding.conn);
                }
                Err(PresenceError::ChannelClosed(player_id.clone()))
            }
        }
    }

    /// Returns `true` if the player has a live binding.
    pub fn is_bound(&self, player_id: &PlayerId) -> bool {
        self.bindings.contains_key(player_id)
    }

    /// The connection currently bound for a player.
    pub fn connection_of(&self, player_id: &PlayerId) -> Option<ConnectionId> {
        self.bindings.get(player_id).map(|b| b.conn)
    }

    /// Number of bound players.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nobody is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn frame(s: &str) -> Frame {
        Arc::from(s.as_bytes())
    }

    #[test]
    fn test_register_then_send_delivers() {
        let mut reg = PresenceRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(reg.register(pid("a"), ConnectionId::new(1), tx), None);

        reg.send(&pid("a"), frame("hi")).unwrap();
        assert_eq!(&*rx.try_recv().unwrap(), b"hi");
    }

    #[test]
    fn test_send_to_unbound_player_is_not_bound() {
        let mut reg = PresenceRegistry::new();
        let err = reg.send(&pid("ghost"), frame("x")).unwrap_err();
        assert!(matches!(err, PresenceError::NotBound(_)));
    }

    #[test]
    fn test_register_supersedes_previous_connection() {
        let mut reg = PresenceRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        reg.register(pid("a"), ConnectionId::new(1), tx1);
        let old = reg.register(pid("a"), ConnectionId::new(2), tx2);

        assert_eq!(old, Some(ConnectionId::new(1)));
        assert_eq!(reg.connection_of(&pid("a")), Some(ConnectionId::new(2)));
        reg.send(&pid("a"), frame("new")).unwrap();
        assert!(rx1.try_recv().is_err());
        assert_eq!(&*rx2.try_recv().unwrap(), b"new");
    }

    #[test]
    fn test_stale_connection_cannot_unregister_newer_binding() {
        let mut reg = PresenceRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        reg.register(pid("a"), ConnectionId::new(1), tx1);
        reg.register(pid("a"), ConnectionId::new(2), tx2);

        assert_eq!(reg.unregister(ConnectionId::new(1)), None);
        assert!(reg.is_bound(&pid("a")));

        assert_eq!(reg.unregister(ConnectionId::new(2)), Some(pid("a")));
        assert!(!reg.is_bound(&pid("a")));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_reregister_same_connection_is_not_superseding() {
        let mut reg = PresenceRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        reg.register(pid("a"), ConnectionId::new(1), tx.clone());
        assert_eq!(reg.register(pid("a"), ConnectionId::new(1), tx), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_connection_switching_ids_releases_old_id() {
        let mut reg = PresenceRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        reg.register(pid("a"), ConnectionId::new(1), tx.clone());
        reg.register(pid("b"), ConnectionId::new(1), tx);

        assert!(!reg.is_bound(&pid("a")));
        assert!(reg.is_bound(&pid("b")));
        assert_eq!(reg.unregister(ConnectionId::new(1)), Some(pid("b")));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let mut reg = PresenceRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        reg.register(pid("a"), ConnectionId::new(1), tx);

        reg.send(&pid("a"), frame("1")).unwrap();
        let err = reg.send(&pid("a"), frame("2")).unwrap_err();
        assert!(matches!(err, PresenceError::QueueFull(_)));
        assert!(reg.is_bound(&pid("a")), "full queue keeps the binding");

        assert_eq!(&*rx.try_recv().unwrap(), b"1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_removes_binding() {
        let mut reg = PresenceRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        reg.register(pid("a"), ConnectionId::new(1), tx);
        drop(rx);

        let err = reg.send(&pid("a"), frame("x")).unwrap_err();
        assert!(matches!(err, PresenceError::ChannelClosed(_)));
        assert!(!reg.is_bound(&pid("a")));
        assert_eq!(reg.unregister(ConnectionId::new(1)), None);
    }
}

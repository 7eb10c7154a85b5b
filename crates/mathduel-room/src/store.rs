//! Room store: creates rooms, tracks membership, and routes players.

use std::collections::HashMap;

use mathduel_presence::SharedPresence;
use mathduel_protocol::{PlayerId, RoomId};
use rand::Rng;

use crate::room::spawn_room;
use crate::{CoordinatorConfig, RoomError, RoomHandle};

/// Alphabet for room codes: easy to read aloud and type on a phone.
const ROOM_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a random room code of `len` characters from
/// [`ROOM_CODE_ALPHABET`].
pub(crate) fn random_room_code<R: Rng + ?Sized>(len: usize, rng: &mut R) -> RoomId {
    let code: String = (0..len)
        .map(|_| {
            let i = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            char::from(ROOM_CODE_ALPHABET[i])
        })
        .collect();
    RoomId(code)
}

/// All rooms, plus the player → room index.
///
/// Lives behind the coordinator's store lock. Methods that move players
/// await room actors while that lock is held, which is what keeps the
/// index and room membership in step.
pub(crate) struct RoomStore {
    /// Active rooms, keyed by normalized room code.
    rooms: HashMap<RoomId, RoomHandle>,

    /// The room each player is currently in. A player is in at most ONE
    /// room, and that room's member list contains them.
    player_rooms: HashMap<PlayerId, RoomId>,
}

impl RoomStore {
    pub(crate) fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
        }
    }

    /// Picks a code no live room uses.
    fn allocate_id(&self, len: usize) -> RoomId {
        let mut rng = rand::rng();
        loop {
            let id = random_room_code(len, &mut rng);
            if !self.rooms.contains_key(&id) {
                return id;
            }
            tracing::debug!(room_id = %id, "room code collision, retrying");
        }
    }

    /// Silently removes a player from whatever room they are in.
    async fn detach(&mut self, player_id: &PlayerId) {
        let Some(previous) = self.player_rooms.remove(player_id) else {
            return;
        };
        if let Some(handle) = self.rooms.get(&previous) {
            if let Err(e) = handle.leave(player_id.clone(), false).await {
                tracing::warn!(room_id = %previous, %player_id, error = %e, "failed to detach player");
            }
        }
        tracing::debug!(room_id = %previous, %player_id, "player detached from previous room");
    }

    /// Creates a room with `creator` as its only member.
    pub(crate) async fn create_room(
        &mut self,
        creator: PlayerId,
        config: &CoordinatorConfig,
        presence: &SharedPresence,
    ) -> RoomId {
        self.detach(&creator).await;

        let room_id = self.allocate_id(config.room_code_len);
        let handle = spawn_room(
            room_id.clone(),
            creator.clone(),
            config.clone(),
            presence.clone(),
        );
        self.rooms.insert(room_id.clone(), handle);
        self.player_rooms.insert(creator.clone(), room_id.clone());
        tracing::info!(%room_id, %creator, "room created");
        room_id
    }

    /// Moves a player into `room_id`. Returns the normalized id.
    pub(crate) async fn join_room(
        &mut self,
        player_id: PlayerId,
        room_id: &RoomId,
    ) -> Result<RoomId, RoomError> {
        let room_id = room_id.normalized();
        let handle = self
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        if self.player_rooms.get(&player_id) != Some(&room_id) {
            self.detach(&player_id).await;
        }
        handle.join(player_id.clone()).await?;
        self.player_rooms.insert(player_id, room_id.clone());
        Ok(room_id)
    }

    /// Removes a player from their room and broadcasts to it.
    pub(crate) async fn leave_room(
        &mut self,
        player_id: &PlayerId,
    ) -> Result<RoomId, RoomError> {
        let room_id = self
            .player_rooms
            .remove(player_id)
            .ok_or_else(|| RoomError::NoActiveRoom(player_id.clone()))?;
        if let Some(handle) = self.rooms.get(&room_id) {
            handle.leave(player_id.clone(), true).await?;
        }
        Ok(room_id)
    }

    /// Handle to the room a player is in.
    pub(crate) fn room_of(
        &self,
        player_id: &PlayerId,
    ) -> Result<RoomHandle, RoomError> {
        self.player_rooms
            .get(player_id)
            .and_then(|id| self.rooms.get(id))
            .cloned()
            .ok_or_else(|| RoomError::NoActiveRoom(player_id.clone()))
    }

    /// Handle to a room by (un-normalized) code.
    pub(crate) fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(&room_id.normalized()).cloned()
    }

    /// The room id a player is currently in, if any.
    pub(crate) fn player_room(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.player_rooms.get(player_id).cloned()
    }

    /// Cloned handles to all rooms, so callers can talk to actors after
    /// releasing the store lock.
    pub(crate) fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

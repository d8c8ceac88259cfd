//! In-memory room registry: a process-wide singleton with concurrent reads
//! and a brief write lock for create/remove. Injected into handlers rather
//! than accessed globally so tests can supply their own instance.

use std::collections::HashMap;
use std::sync::RwLock;

use holdem_engine::{Room, RoomError};

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room with `creator_nickname` as its first player and a
    /// freshly generated id. Returns the new room's id.
    pub fn create_room(&self, id: String, creator_nickname: &str) -> Result<String, RoomError> {
        let creator_nickname = creator_nickname.trim().to_lowercase();
        if creator_nickname.is_empty() {
            return Err(RoomError::EmptyNickname);
        }
        let room = Room::new(id.clone(), creator_nickname);
        self.rooms.write().unwrap().insert(id.clone(), room);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Room> {
        self.rooms.read().unwrap().get(id).cloned()
    }

    /// Rooms currently in `WAITING` state, for the lobby listing.
    pub fn list_waiting(&self) -> Vec<Room> {
        self.rooms
            .read()
            .unwrap()
            .values()
            .filter(|r| r.status == holdem_engine::RoomStatus::Waiting)
            .cloned()
            .collect()
    }

    /// `None` if the room doesn't exist; otherwise the result of
    /// `Room::add_player`.
    pub fn join_room(&self, id: &str, nickname: &str) -> Option<Result<Room, RoomError>> {
        let mut rooms = self.rooms.write().unwrap();
        let room = rooms.get_mut(id)?;
        Some(room.add_player(nickname).map(|()| room.clone()))
    }

    /// Applies `mutator` to the room under the registry's write lock, then
    /// returns a clone of the post-mutation state. Used by the room loop
    /// to commit per-turn state back to the shared registry.
    pub fn with_room_mut<F, T>(&self, id: &str, mutator: F) -> Option<T>
    where
        F: FnOnce(&mut Room) -> T,
    {
        let mut rooms = self.rooms.write().unwrap();
        rooms.get_mut(id).map(mutator)
    }

    pub fn remove(&self, id: &str) -> Option<Room> {
        self.rooms.write().unwrap().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_join_then_list_waiting() {
        let registry = RoomRegistry::new();
        registry.create_room("r1".into(), "alice").unwrap();
        registry.join_room("r1", "bob").unwrap().unwrap();

        let waiting = registry.list_waiting();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].players.len(), 2);
    }

    #[test]
    fn join_room_propagates_duplicate_nickname() {
        let registry = RoomRegistry::new();
        registry.create_room("r1".into(), "alice").unwrap();
        let err = registry.join_room("r1", "ALICE").unwrap().unwrap_err();
        assert_eq!(err, RoomError::DuplicateNickname("alice".into()));
    }

    #[test]
    fn join_unknown_room_is_none() {
        let registry = RoomRegistry::new();
        assert!(registry.join_room("nope", "alice").is_none());
    }

    #[test]
    fn get_missing_room_is_none() {
        let registry = RoomRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}

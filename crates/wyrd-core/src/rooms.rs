// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use wyrd_config::Config;
use wyrd_model::ModelProvider;
use wyrd_store::GameStore;

use crate::session::GameSession;

/// Typed registry of the rooms this process hosts.
///
/// Rooms run their turns independently and in parallel; the registry only
/// guards the map itself.  No global singleton: callers pass the `World`
/// where it is needed.
#[derive(Default)]
pub struct World {
    rooms: Mutex<HashMap<String, Arc<GameSession>>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a room.  Returns the existing session when the id
    /// is already taken.
    pub fn create_room(
        &self,
        room_id: impl Into<String>,
        model: Arc<dyn ModelProvider>,
        config: Arc<Config>,
        store: Option<Arc<dyn GameStore>>,
        seed: Option<u64>,
    ) -> Arc<GameSession> {
        let room_id = room_id.into();
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(existing) = rooms.get(&room_id) {
            return Arc::clone(existing);
        }
        debug!(room_id = %room_id, "creating room");
        let session = GameSession::new(room_id.clone(), model, config, store, seed);
        rooms.insert(room_id, Arc::clone(&session));
        session
    }

    pub fn get_room(&self, room_id: &str) -> Option<Arc<GameSession>> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    pub fn remove_room(&self, room_id: &str) -> Option<Arc<GameSession>> {
        self.rooms.lock().unwrap().remove(room_id)
    }

    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use wyrd_model::ScriptedModelProvider;

    use super::*;

    fn world_with_room(id: &str) -> (World, Arc<GameSession>) {
        let world = World::new();
        let session = world.create_room(
            id,
            Arc::new(ScriptedModelProvider::echo()),
            Arc::new(Config::default()),
            None,
            Some(1),
        );
        (world, session)
    }

    #[test]
    fn create_then_get_returns_same_session() {
        let (world, session) = world_with_room("room-1");
        let fetched = world.get_room("room-1").unwrap();
        assert!(Arc::ptr_eq(&session, &fetched));
    }

    #[test]
    fn create_twice_is_idempotent() {
        let (world, session) = world_with_room("room-1");
        let again = world.create_room(
            "room-1",
            Arc::new(ScriptedModelProvider::echo()),
            Arc::new(Config::default()),
            None,
            None,
        );
        assert!(Arc::ptr_eq(&session, &again));
        assert_eq!(world.room_ids(), vec!["room-1"]);
    }

    #[test]
    fn remove_room_drops_registration() {
        let (world, _) = world_with_room("room-1");
        assert!(world.remove_room("room-1").is_some());
        assert!(world.get_room("room-1").is_none());
    }
}

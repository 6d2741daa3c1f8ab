// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use wyrd_state::{ConversationTurn, GameSnapshot, WorldContext};

use crate::{GameStore, SnapshotInfo, StoreError};

#[derive(Default)]
struct RoomRecord {
    turns: Vec<ConversationTurn>,
    world_context: Option<WorldContext>,
    snapshots: BTreeMap<String, (GameSnapshot, Option<String>)>,
}

/// In-memory store for tests and ephemeral rooms.  Same contract as the
/// file store, no disk.
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted turns for a room (test inspection helper).
    pub fn turn_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|r| r.turns.len())
            .unwrap_or(0)
    }

    /// The persisted world context for a room (test inspection helper).
    pub fn world_context(&self, room_id: &str) -> Option<WorldContext> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .and_then(|r| r.world_context.clone())
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn append_turn(&self, room_id: &str, turn: ConversationTurn) -> Result<(), StoreError> {
        self.rooms
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .turns
            .push(turn);
        Ok(())
    }

    async fn list_turns(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let rooms = self.rooms.lock().unwrap();
        let turns = rooms.get(room_id).map(|r| r.turns.clone()).unwrap_or_default();
        Ok(match limit {
            Some(n) if n < turns.len() => turns[turns.len() - n..].to_vec(),
            _ => turns,
        })
    }

    async fn upsert_world_context(
        &self,
        room_id: &str,
        world_context: WorldContext,
    ) -> Result<(), StoreError> {
        self.rooms
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .world_context = Some(world_context);
        Ok(())
    }

    async fn save_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
        snapshot: GameSnapshot,
        description: Option<String>,
    ) -> Result<(), StoreError> {
        self.rooms
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .snapshots
            .insert(slot_name.to_string(), (snapshot, description));
        Ok(())
    }

    async fn load_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
    ) -> Result<Option<GameSnapshot>, StoreError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get(room_id)
            .and_then(|r| r.snapshots.get(slot_name))
            .map(|(s, _)| s.clone()))
    }

    async fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotInfo>, StoreError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|r| {
                r.snapshots
                    .iter()
                    .map(|(slot, (s, d))| SnapshotInfo {
                        slot_name: slot.clone(),
                        description: d.clone(),
                        saved_at_ms: s.saved_at_ms,
                        history_len: s.history_len,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_snapshot(&self, room_id: &str, slot_name: &str) -> Result<bool, StoreError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get_mut(room_id)
            .map(|r| r.snapshots.remove(slot_name).is_some())
            .unwrap_or(false))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wyrd_state::{ConversationTurn, GameSnapshot, WorldContext};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("write conflict on room '{0}' after retries")]
    Conflict(String),
}

/// Summary of one saved snapshot slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub slot_name: String,
    pub description: Option<String>,
    pub saved_at_ms: i64,
    pub history_len: usize,
}

/// Persistence port consumed by the turn engine.
///
/// The engine treats every operation as fire-and-forget from the turn's
/// perspective: failures are logged and the in-memory state stays
/// authoritative.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Append one completed turn to the room's conversation log.
    async fn append_turn(&self, room_id: &str, turn: ConversationTurn) -> Result<(), StoreError>;

    /// The most recent `limit` turns in chronological order
    /// (all turns when `limit` is `None`).
    async fn list_turns(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Replace the room's persisted world context.
    async fn upsert_world_context(
        &self,
        room_id: &str,
        world_context: WorldContext,
    ) -> Result<(), StoreError>;

    /// Save (or overwrite) a snapshot under `(room_id, slot_name)`.
    async fn save_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
        snapshot: GameSnapshot,
        description: Option<String>,
    ) -> Result<(), StoreError>;

    async fn load_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
    ) -> Result<Option<GameSnapshot>, StoreError>;

    async fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotInfo>, StoreError>;

    /// Returns `true` when a snapshot existed and was deleted.
    async fn delete_snapshot(&self, room_id: &str, slot_name: &str) -> Result<bool, StoreError>;
}

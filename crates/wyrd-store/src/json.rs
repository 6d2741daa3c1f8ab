// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Single-file-per-room JSON store.
//!
//! Each room persists as `<data_dir>/rooms/<room_id>.json` holding the turn
//! log, the world context, and all snapshot slots.  Writes go through an
//! in-process advisory mutex plus a document version check, so an external
//! writer racing the process is detected and retried a bounded number of
//! times rather than silently clobbered.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use wyrd_state::{ConversationTurn, GameSnapshot, WorldContext};

use crate::{GameStore, SnapshotInfo, StoreError};

const WRITE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    snapshot: GameSnapshot,
    description: Option<String>,
}

/// The on-disk shape of one room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RoomDoc {
    /// Incremented on every write; checked before overwriting.
    version: u64,
    #[serde(default)]
    turns: Vec<ConversationTurn>,
    #[serde(default)]
    world_context: Option<WorldContext>,
    #[serde(default)]
    snapshots: BTreeMap<String, SnapshotEntry>,
}

pub struct JsonFileStore {
    dir: PathBuf,
    /// Advisory write mutex: serializes all read-modify-write cycles in this
    /// process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store rooted at `<data_dir>/rooms/`, created on first use.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into().join("rooms"),
            write_lock: Mutex::new(()),
        }
    }

    fn room_path(&self, room_id: &str) -> PathBuf {
        // Room ids are internal identifiers, but never trust them as paths.
        let safe: String = room_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn read_doc(path: &Path) -> Result<RoomDoc, StoreError> {
        if !path.exists() {
            return Ok(RoomDoc::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_doc(path: &Path, doc: &RoomDoc) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash mid-write never truncates the room.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read-modify-write with version check.  Retries when another writer
    /// bumped the version between our read and write.
    async fn mutate(
        &self,
        room_id: &str,
        mut apply: impl FnMut(&mut RoomDoc),
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.room_path(room_id);

        for attempt in 0..WRITE_RETRIES {
            let mut doc = Self::read_doc(&path)?;
            let read_version = doc.version;
            apply(&mut doc);
            doc.version = read_version + 1;

            // Version check: another process may have written since our read.
            let current = Self::read_doc(&path)?.version;
            if current != read_version {
                debug!(room_id, attempt, "version conflict, retrying write");
                continue;
            }
            Self::write_doc(&path, &doc)?;
            return Ok(());
        }
        Err(StoreError::Conflict(room_id.to_string()))
    }
}

#[async_trait]
impl GameStore for JsonFileStore {
    async fn append_turn(&self, room_id: &str, turn: ConversationTurn) -> Result<(), StoreError> {
        self.mutate(room_id, move |doc| doc.turns.push(turn.clone())).await
    }

    async fn list_turns(
        &self,
        room_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let doc = Self::read_doc(&self.room_path(room_id))?;
        let turns = doc.turns;
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
        self.mutate(room_id, move |doc| {
            doc.world_context = Some(world_context.clone());
        })
        .await
    }

    async fn save_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
        snapshot: GameSnapshot,
        description: Option<String>,
    ) -> Result<(), StoreError> {
        let slot = slot_name.to_string();
        self.mutate(room_id, move |doc| {
            doc.snapshots.insert(
                slot.clone(),
                SnapshotEntry {
                    snapshot: snapshot.clone(),
                    description: description.clone(),
                },
            );
        })
        .await
    }

    async fn load_snapshot(
        &self,
        room_id: &str,
        slot_name: &str,
    ) -> Result<Option<GameSnapshot>, StoreError> {
        let doc = Self::read_doc(&self.room_path(room_id))?;
        Ok(doc.snapshots.get(slot_name).map(|e| e.snapshot.clone()))
    }

    async fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotInfo>, StoreError> {
        let doc = Self::read_doc(&self.room_path(room_id))?;
        Ok(doc
            .snapshots
            .iter()
            .map(|(slot, e)| SnapshotInfo {
                slot_name: slot.clone(),
                description: e.description.clone(),
                saved_at_ms: e.snapshot.saved_at_ms,
                history_len: e.snapshot.history_len,
            })
            .collect())
    }

    async fn delete_snapshot(&self, room_id: &str, slot_name: &str) -> Result<bool, StoreError> {
        let mut existed = false;
        let slot = slot_name.to_string();
        self.mutate(room_id, |doc| {
            existed = doc.snapshots.remove(&slot).is_some();
        })
        .await?;
        Ok(existed)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use wyrd_state::{GameState, PlayerAction};

    use super::*;

    fn store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        (dir, store)
    }

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::new(
            vec![PlayerAction::new("u1", "alice", "act")],
            text,
            "exploration",
        )
    }

    #[tokio::test]
    async fn append_then_list_round_trips() {
        let (_dir, store) = store();
        store.append_turn("room-1", turn("first")).await.unwrap();
        store.append_turn("room-1", turn("second")).await.unwrap();

        let turns = store.list_turns("room-1", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].assistant_response, "first");
        assert_eq!(turns[1].assistant_response, "second");
    }

    #[tokio::test]
    async fn list_turns_limit_returns_most_recent() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.append_turn("room-1", turn(&format!("t{i}"))).await.unwrap();
        }
        let recent = store.list_turns("room-1", Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].assistant_response, "t3");
        assert_eq!(recent[1].assistant_response, "t4");
    }

    #[tokio::test]
    async fn unknown_room_lists_empty() {
        let (_dir, store) = store();
        assert!(store.list_turns("nowhere", None).await.unwrap().is_empty());
        assert!(store.load_snapshot("nowhere", "autosave").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_save_load_round_trip() {
        let (_dir, store) = store();
        let mut gs = GameState::new("room-1");
        gs.character_mut("fighter").current_hp = 3;
        gs.world_context.push_fact("the bridge is out", 50);
        gs.world_context.set_flag("bridge_out", "true");
        let snap = GameSnapshot::of(&gs, 4);

        store
            .save_snapshot("room-1", "slot-a", snap.clone(), Some("before the bridge".into()))
            .await
            .unwrap();
        let loaded = store.load_snapshot("room-1", "slot-a").await.unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.state.character_states, gs.character_states);
        assert_eq!(loaded.state.world_context, gs.world_context);
    }

    #[tokio::test]
    async fn save_snapshot_overwrites_slot() {
        let (_dir, store) = store();
        let gs = GameState::new("room-1");
        store
            .save_snapshot("room-1", "s", GameSnapshot::of(&gs, 1), None)
            .await
            .unwrap();
        store
            .save_snapshot("room-1", "s", GameSnapshot::of(&gs, 2), None)
            .await
            .unwrap();
        let loaded = store.load_snapshot("room-1", "s").await.unwrap().unwrap();
        assert_eq!(loaded.history_len, 2);
        assert_eq!(store.list_snapshots("room-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_snapshots_reports_metadata() {
        let (_dir, store) = store();
        let gs = GameState::new("room-1");
        store
            .save_snapshot("room-1", "autosave", GameSnapshot::of(&gs, 7), Some("auto".into()))
            .await
            .unwrap();
        let infos = store.list_snapshots("room-1").await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].slot_name, "autosave");
        assert_eq!(infos[0].description.as_deref(), Some("auto"));
        assert_eq!(infos[0].history_len, 7);
    }

    #[tokio::test]
    async fn delete_snapshot_reports_existence() {
        let (_dir, store) = store();
        let gs = GameState::new("room-1");
        store
            .save_snapshot("room-1", "s", GameSnapshot::of(&gs, 0), None)
            .await
            .unwrap();
        assert!(store.delete_snapshot("room-1", "s").await.unwrap());
        assert!(!store.delete_snapshot("room-1", "s").await.unwrap());
        assert!(store.load_snapshot("room-1", "s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn world_context_upsert_replaces() {
        let (_dir, store) = store();
        let mut wc = WorldContext::default();
        wc.push_event("goblins fled", 12);
        store.upsert_world_context("room-1", wc.clone()).await.unwrap();
        let mut wc2 = wc.clone();
        wc2.push_fact("the mill burned down", 50);
        store.upsert_world_context("room-1", wc2).await.unwrap();

        // Context rides the same document as the turns.
        let path = store.room_path("room-1");
        let doc = JsonFileStore::read_doc(&path).unwrap();
        assert_eq!(doc.world_context.unwrap().world_facts.len(), 1);
    }

    #[tokio::test]
    async fn version_increments_on_each_write() {
        let (_dir, store) = store();
        store.append_turn("room-1", turn("a")).await.unwrap();
        store.append_turn("room-1", turn("b")).await.unwrap();
        let doc = JsonFileStore::read_doc(&store.room_path("room-1")).unwrap();
        assert_eq!(doc.version, 2);
    }

    #[tokio::test]
    async fn room_id_is_sanitized_for_paths() {
        let (_dir, store) = store();
        store.append_turn("../evil", turn("x")).await.unwrap();
        let path = store.room_path("../evil");
        assert!(!path.to_string_lossy().contains(".."));
        assert!(path.exists());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::character::{ActiveCondition, CharacterState};

/// Lifecycle of a room.  Only `InGame` permits turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    Open,
    Ready,
    InGame,
    Suspended,
}

impl RoomPhase {
    /// Allowed lifecycle edges: Open → Ready → InGame → Suspended → Ready.
    pub fn can_transition(self, to: RoomPhase) -> bool {
        matches!(
            (self, to),
            (RoomPhase::Open, RoomPhase::Ready)
                | (RoomPhase::Ready, RoomPhase::InGame)
                | (RoomPhase::InGame, RoomPhase::Suspended)
                | (RoomPhase::Suspended, RoomPhase::Ready)
        )
    }
}

/// Name of the active game-state variant.
///
/// `Combat` is reserved: the `start_combat` tool transitions to it, but until
/// a combat machine exists its turns run through the exploration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Exploration,
    Combat,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKind::Exploration => f.write_str("exploration"),
            StateKind::Combat => f.write_str("combat"),
        }
    }
}

/// The dungeon master's evolving memory: capped FIFO lists of facts and
/// recent events plus a free-form flag map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldContext {
    pub recent_events: VecDeque<String>,
    pub world_facts: VecDeque<String>,
    pub flags: BTreeMap<String, String>,
}

impl WorldContext {
    /// Append a short-term event, dropping the oldest beyond `cap`.
    pub fn push_event(&mut self, event: impl Into<String>, cap: usize) {
        self.recent_events.push_back(event.into());
        while self.recent_events.len() > cap {
            self.recent_events.pop_front();
        }
    }

    /// Append a long-term fact, dropping the oldest beyond `cap`.
    pub fn push_fact(&mut self, fact: impl Into<String>, cap: usize) {
        self.world_facts.push_back(fact.into());
        while self.world_facts.len() > cap {
            self.world_facts.pop_front();
        }
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.flags.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.recent_events.is_empty() && self.world_facts.is_empty() && self.flags.is_empty()
    }
}

/// Room-scoped game aggregate.  Mutated only on the turn-executing task;
/// readers clone a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub room_id: String,
    pub module_name: Option<String>,
    pub location: String,
    pub character_states: BTreeMap<String, CharacterState>,
    pub character_overlays: BTreeMap<String, Vec<ActiveCondition>>,
    pub world_context: WorldContext,
    pub active_encounters: Vec<String>,
    pub last_updated_ms: i64,
}

impl GameState {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            module_name: None,
            location: "an unremarkable crossroads".into(),
            character_states: BTreeMap::new(),
            character_overlays: BTreeMap::new(),
            world_context: WorldContext::default(),
            active_encounters: Vec::new(),
            last_updated_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Fetch a character's state, creating it lazily on first reference.
    pub fn character_mut(&mut self, character_id: &str) -> &mut CharacterState {
        self.character_states
            .entry(character_id.to_string())
            .or_insert_with(|| CharacterState::new(character_id))
    }

    pub fn character(&self, character_id: &str) -> Option<&CharacterState> {
        self.character_states.get(character_id)
    }

    pub fn touch(&mut self) {
        self.last_updated_ms = Utc::now().timestamp_millis();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Room lifecycle ────────────────────────────────────────────────────────

    #[test]
    fn lifecycle_edges() {
        assert!(RoomPhase::Open.can_transition(RoomPhase::Ready));
        assert!(RoomPhase::Ready.can_transition(RoomPhase::InGame));
        assert!(RoomPhase::InGame.can_transition(RoomPhase::Suspended));
        assert!(RoomPhase::Suspended.can_transition(RoomPhase::Ready));
    }

    #[test]
    fn illegal_edges_rejected() {
        assert!(!RoomPhase::Open.can_transition(RoomPhase::InGame));
        assert!(!RoomPhase::InGame.can_transition(RoomPhase::Open));
        assert!(!RoomPhase::Suspended.can_transition(RoomPhase::InGame));
    }

    // ── World context caps ────────────────────────────────────────────────────

    #[test]
    fn events_drop_oldest_beyond_cap() {
        let mut wc = WorldContext::default();
        for i in 0..15 {
            wc.push_event(format!("event {i}"), 12);
        }
        assert_eq!(wc.recent_events.len(), 12);
        assert_eq!(wc.recent_events.front().map(String::as_str), Some("event 3"));
        assert_eq!(wc.recent_events.back().map(String::as_str), Some("event 14"));
    }

    #[test]
    fn facts_drop_oldest_beyond_cap() {
        let mut wc = WorldContext::default();
        for i in 0..55 {
            wc.push_fact(format!("fact {i}"), 50);
        }
        assert_eq!(wc.world_facts.len(), 50);
        assert_eq!(wc.world_facts.front().map(String::as_str), Some("fact 5"));
    }

    #[test]
    fn flags_overwrite_by_key() {
        let mut wc = WorldContext::default();
        wc.set_flag("gate_open", "false");
        wc.set_flag("gate_open", "true");
        assert_eq!(wc.flags.get("gate_open").map(String::as_str), Some("true"));
        assert_eq!(wc.flags.len(), 1);
    }

    // ── Game state ────────────────────────────────────────────────────────────

    #[test]
    fn character_created_lazily_once() {
        let mut gs = GameState::new("room-1");
        let id = gs.character_mut("fighter").instance_id.clone();
        let again = gs.character_mut("fighter").instance_id.clone();
        assert_eq!(id, again, "second lookup must not recreate the character");
        assert_eq!(gs.character_states.len(), 1);
    }

    #[test]
    fn unknown_character_is_none() {
        let gs = GameState::new("room-1");
        assert!(gs.character("ghost").is_none());
    }

    #[test]
    fn game_state_round_trips() {
        let mut gs = GameState::new("room-7");
        gs.character_mut("fighter").current_hp = 7;
        gs.world_context.push_fact("the keep has fallen", 50);
        gs.world_context.set_flag("keep_fallen", "true");
        let json = serde_json::to_string(&gs).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gs);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wyrd_rules::Ability;

/// A timed condition applied on top of a character (stun, blessing, …).
/// Kept separate from `CharacterState.conditions` so transient overlays can
/// be cleared without touching the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub name: String,
    /// Remaining duration in turns; `None` means until removed.
    pub duration_turns: Option<u32>,
    pub source: Option<String>,
}

/// Mutable per-character state inside a room.
///
/// Created lazily the first time a member references the character; the
/// defaults describe an unhurt, unremarkable adventurer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    pub instance_id: String,
    pub character_id: String,
    pub character_name: Option<String>,
    pub current_hp: i32,
    pub temporary_hp: i32,
    pub conditions: Vec<String>,
    pub active_buffs: Vec<String>,
    pub known_spells: Vec<String>,
    pub equipment_state: BTreeMap<String, String>,
    /// Flat ability modifiers (already derived from scores).
    #[serde(default)]
    pub ability_modifiers: BTreeMap<Ability, i32>,
    /// Abilities the character is proficient in for checks and saves.
    #[serde(default)]
    pub proficiencies: BTreeSet<Ability>,
    #[serde(default = "default_proficiency_bonus")]
    pub proficiency_bonus: i32,
}

fn default_proficiency_bonus() -> i32 {
    2
}

impl CharacterState {
    pub fn new(character_id: impl Into<String>) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            character_id: character_id.into(),
            character_name: None,
            current_hp: 10,
            temporary_hp: 0,
            conditions: Vec::new(),
            active_buffs: Vec::new(),
            known_spells: Vec::new(),
            equipment_state: BTreeMap::new(),
            ability_modifiers: BTreeMap::new(),
            proficiencies: BTreeSet::new(),
            proficiency_bonus: default_proficiency_bonus(),
        }
    }

    /// Flat modifier for an ability; unknown abilities roll at +0.
    pub fn ability_modifier(&self, ability: Ability) -> i32 {
        self.ability_modifiers.get(&ability).copied().unwrap_or(0)
    }

    /// Proficiency bonus when the character is proficient, else `None`.
    pub fn proficiency_for(&self, ability: Ability) -> Option<i32> {
        self.proficiencies
            .contains(&ability)
            .then_some(self.proficiency_bonus)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use wyrd_rules::{Ability, RollOutcome};

/// Which mechanic produced a dice roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Ability,
    SavingThrow,
    Group,
}

/// Payload of a `dice-roll` event.
///
/// For group checks the report is collective: `character_id` /
/// `character_name` are comma-joined, `roll.rolls` holds the individual
/// totals and `roll.total` the success count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollReport {
    pub check_type: CheckType,
    pub character_id: String,
    pub character_name: String,
    pub ability: Option<Ability>,
    pub dc: Option<i32>,
    pub roll: RollOutcome,
    pub success: bool,
    pub reason: String,
}

/// Side effects published by tools on the effect channel.
///
/// The turn loop drains these after each tool execution and turns them into
/// session events; gate and transition effects are additionally staged on
/// the session and applied when the turn ends.
#[derive(Debug, Clone)]
pub enum ToolEffect {
    DiceRoll(DiceRollReport),
    RestrictGate {
        allowed_character_ids: BTreeSet<String>,
        reason: String,
    },
    StartCombat {
        encounter_brief: String,
    },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

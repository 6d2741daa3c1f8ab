// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dice::{DiceFormula, RollOutcome};

/// The six abilities a check can be rolled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Ability::Str,
        Ability::Dex,
        Ability::Con,
        Ability::Int,
        Ability::Wis,
        Ability::Cha,
    ];
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ability::Str => "STR",
            Ability::Dex => "DEX",
            Ability::Con => "CON",
            Ability::Int => "INT",
            Ability::Wis => "WIS",
            Ability::Cha => "CHA",
        };
        f.write_str(s)
    }
}

impl FromStr for Ability {
    type Err = String;

    /// Accepts the three-letter tag in any case, plus the full ability name
    /// ("strength", "Dexterity", …) since models emit both.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STR" | "STRENGTH" => Ok(Ability::Str),
            "DEX" | "DEXTERITY" => Ok(Ability::Dex),
            "CON" | "CONSTITUTION" => Ok(Ability::Con),
            "INT" | "INTELLIGENCE" => Ok(Ability::Int),
            "WIS" | "WISDOM" => Ok(Ability::Wis),
            "CHA" | "CHARISMA" => Ok(Ability::Cha),
            other => Err(format!("unknown ability '{other}'")),
        }
    }
}

/// Result of one d20 check against a DC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub roll: RollOutcome,
    pub dc: i32,
    pub success: bool,
}

/// Roll `d20 + modifier (+ proficiency)` against `dc`.
/// Success is `total >= dc`.
pub fn d20_check(
    modifier: i32,
    proficiency: Option<i32>,
    dc: i32,
    rng: &mut impl Rng,
) -> CheckResult {
    let flat = modifier + proficiency.unwrap_or(0);
    // The combined modifier is clamped into formula range; ability modifiers
    // and proficiency bonuses are single digits in practice.
    let formula = DiceFormula::new(1, 20, flat.clamp(-1000, 1000))
        .unwrap_or(DiceFormula { count: 1, sides: 20, modifier: 0 });
    let roll = formula.roll(rng);
    CheckResult {
        dc,
        success: roll.total >= dc,
        roll,
    }
}

/// Group-check rule: the party succeeds when a strict majority of the
/// individual checks succeed.
pub fn group_succeeds(results: &[CheckResult]) -> bool {
    let successes = results.iter().filter(|r| r.success).count();
    successes * 2 > results.len()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Highest die count a single formula may request.
pub const MAX_COUNT: u32 = 100;
/// Highest number of sides a die may have.
pub const MAX_SIDES: u32 = 1000;
/// Largest absolute flat modifier.
pub const MAX_MODIFIER: i32 = 1000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("invalid dice formula '{0}'")]
    InvalidFormula(String),
}

/// A parsed dice expression: `count? "d" sides modifier?`.
///
/// `count` defaults to 1 when omitted (`d20` == `1d20`).  Ranges:
/// count 1–100, sides 2–1000, modifier −1000…+1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Result<Self, DiceError> {
        let f = Self { count, sides, modifier };
        if !(1..=MAX_COUNT).contains(&count)
            || !(2..=MAX_SIDES).contains(&sides)
            || modifier.abs() > MAX_MODIFIER
        {
            return Err(DiceError::InvalidFormula(f.to_string()));
        }
        Ok(f)
    }

    /// Roll the formula with the supplied RNG.  Pure apart from the RNG:
    /// a seeded generator makes the outcome fully deterministic.
    pub fn roll(&self, rng: &mut impl Rng) -> RollOutcome {
        let rolls: Vec<i32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides) as i32)
            .collect();
        let total = rolls.iter().sum::<i32>() + self.modifier;
        RollOutcome {
            formula: self.to_string(),
            rolls,
            modifier: self.modifier,
            total,
        }
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier.cmp(&0) {
            std::cmp::Ordering::Greater => write!(f, "+{}", self.modifier),
            std::cmp::Ordering::Less => write!(f, "{}", self.modifier),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = || DiceError::InvalidFormula(input.to_string());

        let d_pos = input
            .char_indices()
            .find(|(_, c)| *c == 'd' || *c == 'D')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;

        let count_str = &input[..d_pos];
        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };

        let rest = &input[d_pos + 1..];
        // Split sides from an optional trailing +N / -N modifier.
        let mod_pos = rest
            .char_indices()
            .find(|(_, c)| *c == '+' || *c == '-')
            .map(|(i, _)| i);
        let (sides_str, modifier) = match mod_pos {
            Some(i) => {
                let m: i32 = rest[i..].parse().map_err(|_| invalid())?;
                (&rest[..i], m)
            }
            None => (rest, 0),
        };
        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;

        Self::new(count, sides, modifier).map_err(|_| invalid())
    }
}

/// The outcome of rolling one formula: individual dice, the flat modifier,
/// and the grand total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub formula: String,
    pub rolls: Vec<i32>,
    pub modifier: i32,
    pub total: i32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

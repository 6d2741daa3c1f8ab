// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod checks;
mod dice;

pub use checks::{d20_check, group_succeeds, Ability, CheckResult};
pub use dice::{DiceError, DiceFormula, RollOutcome};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod checks;
mod control;
mod effects;
mod registry;
mod tool;

pub use checks::{AbilityCheckTool, CheckError, GroupCheckTool, SavingThrowTool};
pub use control::{RestrictActionTool, StartCombatTool};
pub use effects::{CheckType, DiceRollReport, ToolEffect};
pub use registry::{exploration_registry, ToolRegistry, ToolSchema};
pub use tool::{SharedGameState, SharedRng, Tool, ToolCall, ToolOutput};

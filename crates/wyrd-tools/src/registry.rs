// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::checks::{AbilityCheckTool, GroupCheckTool, SavingThrowTool};
use crate::control::{RestrictActionTool, StartCombatTool};
use crate::effects::ToolEffect;
use crate::tool::{SharedGameState, SharedRng, Tool, ToolCall, ToolOutput};

/// A tool schema handed to the model layer.  Mirrors the model crate's shape
/// but keeps the tools crate independent from it.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Immutable catalog of the tools the dungeon master may call.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas for all registered tools, name-sorted for a stable
    /// request shape.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => {
                tracing::debug!(tool = %call.name, call_id = %call.id, "executing tool");
                tool.execute(call).await
            }
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed exploration tool set wired to a room's shared state, RNG, and
/// effect channel.
pub fn exploration_registry(
    state: SharedGameState,
    rng: SharedRng,
    effects: mpsc::Sender<ToolEffect>,
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(AbilityCheckTool {
        state: state.clone(),
        rng: rng.clone(),
        effects: effects.clone(),
    });
    reg.register(SavingThrowTool {
        state: state.clone(),
        rng: rng.clone(),
        effects: effects.clone(),
    });
    reg.register(GroupCheckTool {
        state,
        rng,
        effects: effects.clone(),
    });
    reg.register(RestrictActionTool {
        effects: effects.clone(),
    });
    reg.register(StartCombatTool { effects });
    reg
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

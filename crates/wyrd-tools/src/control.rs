// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::effects::ToolEffect;
use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestrictArgs {
    allowed_character_ids: Vec<String>,
    reason: String,
}

/// `restrict_action(allowedCharacterIds, reason)` — limits who may act on
/// the next turn.  The restriction is staged on the session and installed
/// when the current turn ends; the in-flight drain was already committed.
pub struct RestrictActionTool {
    pub effects: mpsc::Sender<ToolEffect>,
}

#[async_trait]
impl Tool for RestrictActionTool {
    fn name(&self) -> &str {
        "restrict_action"
    }

    fn description(&self) -> &str {
        "Restrict the next turn so that only the listed characters may act. \
         Use when the situation prevents some characters from acting (stunned, \
         absent, silenced)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "allowedCharacterIds": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Characters still allowed to act"
                },
                "reason": { "type": "string", "description": "Why the others cannot act" }
            },
            "required": ["allowedCharacterIds", "reason"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: RestrictArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        if args.allowed_character_ids.is_empty() {
            return ToolOutput::err(&call.id, "invalid arguments: allowedCharacterIds is empty");
        }
        let allowed: BTreeSet<String> = args.allowed_character_ids.into_iter().collect();
        let summary = json!({
            "restricted_to": allowed.iter().collect::<Vec<_>>(),
            "reason": args.reason,
        })
        .to_string();
        let _ = self
            .effects
            .send(ToolEffect::RestrictGate {
                allowed_character_ids: allowed,
                reason: args.reason,
            })
            .await;
        ToolOutput::ok(&call.id, summary)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartCombatArgs {
    encounter_brief: String,
}

/// `start_combat(encounterBrief)` — stages a transition into the combat
/// state, applied when the current turn ends.
pub struct StartCombatTool {
    pub effects: mpsc::Sender<ToolEffect>,
}

#[async_trait]
impl Tool for StartCombatTool {
    fn name(&self) -> &str {
        "start_combat"
    }

    fn description(&self) -> &str {
        "Begin a combat encounter. Provide a short brief of the opposition \
         and the battlefield."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "encounterBrief": {
                    "type": "string",
                    "description": "One-paragraph description of the encounter"
                }
            },
            "required": ["encounterBrief"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: StartCombatArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        let _ = self
            .effects
            .send(ToolEffect::StartCombat {
                encounter_brief: args.encounter_brief.clone(),
            })
            .await;
        ToolOutput::ok(
            &call.id,
            json!({ "combat_starting": true, "brief": args.encounter_brief }).to_string(),
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

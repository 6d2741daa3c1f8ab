// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wyrd_rules::{d20_check, group_succeeds, Ability, CheckResult, RollOutcome};

use crate::effects::{CheckType, DiceRollReport, ToolEffect};
use crate::tool::{SharedGameState, SharedRng, Tool, ToolCall, ToolOutput};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("unknown character '{0}'")]
    UnknownCharacter(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckArgs {
    character_id: String,
    ability: String,
    dc: i32,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupCheckArgs {
    character_ids: Vec<String>,
    ability: String,
    dc: i32,
    #[serde(default)]
    reason: String,
}

fn check_params_schema(id_field: &str, id_type: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            id_field: id_type,
            "ability": {
                "type": "string",
                "enum": ["STR", "DEX", "CON", "INT", "WIS", "CHA"],
                "description": "Ability the check is rolled against"
            },
            "dc": { "type": "integer", "description": "Difficulty class to beat" },
            "reason": { "type": "string", "description": "Narrative reason for the check" }
        },
        "required": [id_field, "ability", "dc", "reason"]
    })
}

/// Roll `d20 + ability modifier (+ proficiency)` for one character and
/// publish the result on the effect channel.
struct SingleCheck<'a> {
    state: &'a SharedGameState,
    rng: &'a SharedRng,
    effects: &'a mpsc::Sender<ToolEffect>,
    check_type: CheckType,
}

impl SingleCheck<'_> {
    async fn run(&self, call: &ToolCall) -> ToolOutput {
        let args: CheckArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        let ability: Ability = match args.ability.parse() {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let (name, modifier, proficiency) = {
            let state = self.state.lock().await;
            match state.character(&args.character_id) {
                Some(c) => (
                    c.character_name.clone().unwrap_or_else(|| c.character_id.clone()),
                    c.ability_modifier(ability),
                    c.proficiency_for(ability),
                ),
                None => {
                    let e = CheckError::UnknownCharacter(args.character_id.clone());
                    return ToolOutput::err(&call.id, e.to_string());
                }
            }
        };

        let result = {
            let mut rng = self.rng.lock().expect("rng mutex poisoned");
            d20_check(modifier, proficiency, args.dc, &mut *rng)
        };

        let report = DiceRollReport {
            check_type: self.check_type,
            character_id: args.character_id,
            character_name: name,
            ability: Some(ability),
            dc: Some(args.dc),
            roll: result.roll.clone(),
            success: result.success,
            reason: args.reason,
        };
        let summary = json!({
            "total": result.roll.total,
            "rolls": result.roll.rolls,
            "dc": args.dc,
            "success": result.success,
        })
        .to_string();
        let _ = self.effects.send(ToolEffect::DiceRoll(report)).await;
        ToolOutput::ok(&call.id, summary)
    }
}

/// `request_ability_check(characterId, ability, dc, reason)` → dice roll.
pub struct AbilityCheckTool {
    pub state: SharedGameState,
    pub rng: SharedRng,
    pub effects: mpsc::Sender<ToolEffect>,
}

#[async_trait]
impl Tool for AbilityCheckTool {
    fn name(&self) -> &str {
        "request_ability_check"
    }

    fn description(&self) -> &str {
        "Roll an ability check for one character against a difficulty class. \
         Use when the outcome of a player's action is uncertain."
    }

    fn parameters_schema(&self) -> Value {
        check_params_schema("characterId", json!({ "type": "string" }))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        SingleCheck {
            state: &self.state,
            rng: &self.rng,
            effects: &self.effects,
            check_type: CheckType::Ability,
        }
        .run(call)
        .await
    }
}

/// `request_saving_throw(characterId, ability, dc, reason)` → dice roll.
/// Same mechanics as an ability check, different semantic label.
pub struct SavingThrowTool {
    pub state: SharedGameState,
    pub rng: SharedRng,
    pub effects: mpsc::Sender<ToolEffect>,
}

#[async_trait]
impl Tool for SavingThrowTool {
    fn name(&self) -> &str {
        "request_saving_throw"
    }

    fn description(&self) -> &str {
        "Roll a saving throw for one character against a difficulty class. \
         Use when a character resists an external effect."
    }

    fn parameters_schema(&self) -> Value {
        check_params_schema("characterId", json!({ "type": "string" }))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        SingleCheck {
            state: &self.state,
            rng: &self.rng,
            effects: &self.effects,
            check_type: CheckType::SavingThrow,
        }
        .run(call)
        .await
    }
}

/// `request_group_check(characterIds, ability, dc, reason)` → one collective
/// dice roll; the party succeeds when a majority of individual checks do.
pub struct GroupCheckTool {
    pub state: SharedGameState,
    pub rng: SharedRng,
    pub effects: mpsc::Sender<ToolEffect>,
}

#[async_trait]
impl Tool for GroupCheckTool {
    fn name(&self) -> &str {
        "request_group_check"
    }

    fn description(&self) -> &str {
        "Roll the same check for several characters at once; the group \
         succeeds when the majority of individual rolls succeed."
    }

    fn parameters_schema(&self) -> Value {
        check_params_schema(
            "characterIds",
            json!({ "type": "array", "items": { "type": "string" } }),
        )
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args: GroupCheckArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };
        if args.character_ids.is_empty() {
            return ToolOutput::err(&call.id, "invalid arguments: characterIds is empty");
        }
        let ability: Ability = match args.ability.parse() {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        // Resolve every participant before rolling anything, so an unknown
        // character fails the whole call instead of a partial roll.
        let mut participants: Vec<(String, String, i32, Option<i32>)> = Vec::new();
        {
            let state = self.state.lock().await;
            for id in &args.character_ids {
                match state.character(id) {
                    Some(c) => participants.push((
                        c.character_id.clone(),
                        c.character_name.clone().unwrap_or_else(|| c.character_id.clone()),
                        c.ability_modifier(ability),
                        c.proficiency_for(ability),
                    )),
                    None => {
                        let e = CheckError::UnknownCharacter(id.clone());
                        return ToolOutput::err(&call.id, e.to_string());
                    }
                }
            }
        }

        let results: Vec<CheckResult> = {
            let mut rng = self.rng.lock().expect("rng mutex poisoned");
            participants
                .iter()
                .map(|(_, _, modifier, proficiency)| {
                    d20_check(*modifier, *proficiency, args.dc, &mut *rng)
                })
                .collect()
        };
        let success = group_succeeds(&results);
        let successes = results.iter().filter(|r| r.success).count();

        let report = DiceRollReport {
            check_type: CheckType::Group,
            character_id: args.character_ids.join(","),
            character_name: participants
                .iter()
                .map(|(_, name, _, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(","),
            ability: Some(ability),
            dc: Some(args.dc),
            roll: RollOutcome {
                formula: format!("{}x1d20 vs DC {}", results.len(), args.dc),
                rolls: results.iter().map(|r| r.roll.total).collect(),
                modifier: 0,
                total: successes as i32,
            },
            success,
            reason: args.reason,
        };
        let summary = json!({
            "totals": results.iter().map(|r| r.roll.total).collect::<Vec<_>>(),
            "dc": args.dc,
            "successes": successes,
            "of": results.len(),
            "success": success,
        })
        .to_string();
        let _ = self.effects.send(ToolEffect::DiceRoll(report)).await;
        ToolOutput::ok(&call.id, summary)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wyrd_rules::Ability;
    use wyrd_state::GameState;

    use super::*;

    fn fixture() -> (SharedGameState, SharedRng, mpsc::Receiver<ToolEffect>, mpsc::Sender<ToolEffect>) {
        let mut gs = GameState::new("room-1");
        {
            let fighter = gs.character_mut("fighter");
            fighter.character_name = Some("Brunhilde".into());
            fighter.ability_modifiers.insert(Ability::Str, 3);
        }
        gs.character_mut("rogue").ability_modifiers.insert(Ability::Dex, 4);
        let state = Arc::new(tokio::sync::Mutex::new(gs));
        let rng = Arc::new(std::sync::Mutex::new(StdRng::seed_from_u64(12)));
        let (tx, rx) = mpsc::channel(16);
        (state, rng, rx, tx)
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "call-1".into(),
            name: name.into(),
            args,
        }
    }

    #[tokio::test]
    async fn ability_check_emits_dice_roll_effect() {
        let (state, rng, mut rx, tx) = fixture();
        let tool = AbilityCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_ability_check",
                json!({"characterId": "fighter", "ability": "STR", "dc": 12, "reason": "Kicking door"}),
            ))
            .await;
        assert!(!out.is_error, "{}", out.content);

        let effect = rx.recv().await.unwrap();
        match effect {
            ToolEffect::DiceRoll(r) => {
                assert_eq!(r.check_type, CheckType::Ability);
                assert_eq!(r.character_name, "Brunhilde");
                assert_eq!(r.ability, Some(Ability::Str));
                assert_eq!(r.roll.modifier, 3);
                assert_eq!(r.success, r.roll.total >= 12);
                assert_eq!(r.reason, "Kicking door");
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_character_is_tool_error() {
        let (state, rng, mut rx, tx) = fixture();
        let tool = AbilityCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_ability_check",
                json!({"characterId": "ghost", "ability": "STR", "dc": 10, "reason": "x"}),
            ))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown character 'ghost'"));
        assert!(rx.try_recv().is_err(), "no effect on error");
    }

    #[tokio::test]
    async fn malformed_arguments_are_tool_error() {
        let (state, rng, _rx, tx) = fixture();
        let tool = AbilityCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call("request_ability_check", json!({"dc": "twelve"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn bad_ability_name_is_tool_error() {
        let (state, rng, _rx, tx) = fixture();
        let tool = AbilityCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_ability_check",
                json!({"characterId": "fighter", "ability": "LUCK", "dc": 10, "reason": "x"}),
            ))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn saving_throw_reports_its_check_type() {
        let (state, rng, mut rx, tx) = fixture();
        let tool = SavingThrowTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_saving_throw",
                json!({"characterId": "rogue", "ability": "DEX", "dc": 14, "reason": "Dodging"}),
            ))
            .await;
        assert!(!out.is_error);
        match rx.recv().await.unwrap() {
            ToolEffect::DiceRoll(r) => assert_eq!(r.check_type, CheckType::SavingThrow),
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[tokio::test]
    async fn group_check_is_collective() {
        let (state, rng, mut rx, tx) = fixture();
        let tool = GroupCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_group_check",
                json!({"characterIds": ["fighter", "rogue"], "ability": "DEX", "dc": 10, "reason": "Sneaking"}),
            ))
            .await;
        assert!(!out.is_error);
        match rx.recv().await.unwrap() {
            ToolEffect::DiceRoll(r) => {
                assert_eq!(r.check_type, CheckType::Group);
                assert_eq!(r.character_id, "fighter,rogue");
                assert_eq!(r.roll.rolls.len(), 2);
                let successes = r.roll.total;
                assert_eq!(r.success, successes * 2 > 2);
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[tokio::test]
    async fn group_check_with_unknown_member_fails_whole_call() {
        let (state, rng, mut rx, tx) = fixture();
        let tool = GroupCheckTool { state, rng, effects: tx };
        let out = tool
            .execute(&call(
                "request_group_check",
                json!({"characterIds": ["fighter", "ghost"], "ability": "STR", "dc": 10, "reason": "x"}),
            ))
            .await;
        assert!(out.is_error);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn seeded_rng_makes_checks_deterministic() {
        let run = |seed: u64| async move {
            let (state, _, mut rx, tx) = fixture();
            let rng = Arc::new(std::sync::Mutex::new(StdRng::seed_from_u64(seed)));
            let tool = AbilityCheckTool { state, rng, effects: tx };
            tool.execute(&call(
                "request_ability_check",
                json!({"characterId": "fighter", "ability": "STR", "dc": 12, "reason": "x"}),
            ))
            .await;
            match rx.recv().await.unwrap() {
                ToolEffect::DiceRoll(r) => r.roll.total,
                other => panic!("unexpected effect: {other:?}"),
            }
        };
        assert_eq!(run(7).await, run(7).await);
    }
}

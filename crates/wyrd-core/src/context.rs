// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Composition of the dungeon master's input from ordered context providers.
//!
//! Each provider contributes tagged system blocks and/or conversation
//! messages; the builder concatenates the blocks into one system message and
//! appends the messages in provider order.  The result is deterministic for
//! a given game state and action set.

use wyrd_model::Message;
use wyrd_state::{ConversationTurn, GameState, PlayerAction};

use crate::prompts::PromptSet;

#[derive(Debug, thiserror::Error)]
#[error("context provider '{provider}' failed: {message}")]
pub struct ContextError {
    pub provider: String,
    pub message: String,
}

/// Everything a provider may draw on for one turn.
pub struct TurnInput<'a> {
    /// Snapshot of the room state (copy-on-read; never the live aggregate).
    pub state: &'a GameState,
    pub pending: &'a [PlayerAction],
    /// The recent turns to include, oldest first.
    pub history: &'a [ConversationTurn],
    pub prompts: &'a PromptSet,
}

/// A provider's contribution to the composed input.
pub enum ContextPart {
    /// Wrapped as `[TAG]…[/TAG]` inside the system message.
    SystemBlock { tag: String, body: String },
    /// Appended verbatim after the system message.
    Message(Message),
}

pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError>;
}

/// Ordered provider pipeline producing the `Vec<Message>` handed to the
/// model driver.
pub struct ContextBuilder {
    providers: Vec<Box<dyn ContextProvider>>,
}

impl ContextBuilder {
    pub fn new(providers: Vec<Box<dyn ContextProvider>>) -> Self {
        Self { providers }
    }

    /// The standard exploration pipeline, in emission order: system prompt,
    /// world context, module context, character profiles, player notes, game
    /// rules, recent history, current player input.
    pub fn standard(player_notes: Vec<(String, String)>, house_rules: Option<String>) -> Self {
        Self::new(vec![
            Box::new(SystemPromptProvider),
            Box::new(WorldContextProvider),
            Box::new(ModuleContextProvider),
            Box::new(CharacterProfilesProvider),
            Box::new(PlayerNotesProvider { notes: player_notes }),
            Box::new(GameRulesProvider { rules: house_rules }),
            Box::new(RecentHistoryProvider),
            Box::new(CurrentInputProvider),
        ])
    }

    pub fn build(&self, input: &TurnInput<'_>) -> Result<Vec<Message>, ContextError> {
        let mut system_text = String::new();
        let mut messages: Vec<Message> = Vec::new();

        for provider in &self.providers {
            for part in provider.contribute(input)? {
                match part {
                    ContextPart::SystemBlock { tag, body } => {
                        if !system_text.is_empty() {
                            system_text.push_str("\n\n");
                        }
                        system_text.push_str(&format!("[{tag}]\n{body}\n[/{tag}]"));
                    }
                    ContextPart::Message(m) => messages.push(m),
                }
            }
        }

        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(Message::system(system_text));
        out.extend(messages);
        Ok(out)
    }
}

fn format_action(a: &PlayerAction) -> String {
    match &a.character_name {
        Some(name) => format!("{} ({}): {}", a.username, name, a.action_text),
        None => format!("{}: {}", a.username, a.action_text),
    }
}

// ─── Providers ────────────────────────────────────────────────────────────────

pub struct SystemPromptProvider;

impl ContextProvider for SystemPromptProvider {
    fn name(&self) -> &str {
        "system_prompt"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        Ok(vec![ContextPart::SystemBlock {
            tag: "SYSTEM_PROMPT".into(),
            body: input.prompts.system_prompt.clone(),
        }])
    }
}

pub struct WorldContextProvider;

impl ContextProvider for WorldContextProvider {
    fn name(&self) -> &str {
        "world_context"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        let wc = &input.state.world_context;
        let mut body = format!("Location: {}", input.state.location);
        if !wc.world_facts.is_empty() {
            body.push_str("\n\nEstablished facts:");
            for fact in &wc.world_facts {
                body.push_str(&format!("\n- {fact}"));
            }
        }
        if !wc.recent_events.is_empty() {
            body.push_str("\n\nRecent events:");
            for event in &wc.recent_events {
                body.push_str(&format!("\n- {event}"));
            }
        }
        if !wc.flags.is_empty() {
            body.push_str("\n\nFlags:");
            for (k, v) in &wc.flags {
                body.push_str(&format!("\n- {k} = {v}"));
            }
        }
        Ok(vec![ContextPart::SystemBlock {
            tag: "WORLD_CONTEXT".into(),
            body,
        }])
    }
}

pub struct ModuleContextProvider;

impl ContextProvider for ModuleContextProvider {
    fn name(&self) -> &str {
        "module_context"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        Ok(match &input.state.module_name {
            Some(module) => vec![ContextPart::SystemBlock {
                tag: "MODULE_CONTEXT".into(),
                body: format!("The party is playing the module \"{module}\"."),
            }],
            None => vec![],
        })
    }
}

pub struct CharacterProfilesProvider;

impl ContextProvider for CharacterProfilesProvider {
    fn name(&self) -> &str {
        "character_profiles"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        if input.state.character_states.is_empty() {
            return Ok(vec![]);
        }
        let mut body = String::new();
        for (id, c) in &input.state.character_states {
            if !body.is_empty() {
                body.push('\n');
            }
            let display = c.character_name.as_deref().unwrap_or(id);
            body.push_str(&format!("{display} ({id}): HP {}", c.current_hp));
            if c.temporary_hp > 0 {
                body.push_str(&format!(" (+{} temp)", c.temporary_hp));
            }
            for (ability, modifier) in &c.ability_modifiers {
                body.push_str(&format!(", {ability} {modifier:+}"));
            }
            if !c.conditions.is_empty() {
                body.push_str(&format!("; conditions: {}", c.conditions.join(", ")));
            }
            if let Some(overlays) = input.state.character_overlays.get(id) {
                if !overlays.is_empty() {
                    let names: Vec<&str> = overlays.iter().map(|o| o.name.as_str()).collect();
                    body.push_str(&format!("; afflicted: {}", names.join(", ")));
                }
            }
        }
        Ok(vec![ContextPart::SystemBlock {
            tag: "CHARACTER_PROFILES".into(),
            body,
        }])
    }
}

pub struct PlayerNotesProvider {
    /// `(author, note)` pairs supplied by the serving layer at construction.
    pub notes: Vec<(String, String)>,
}

impl ContextProvider for PlayerNotesProvider {
    fn name(&self) -> &str {
        "player_notes"
    }

    fn contribute(&self, _input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        if self.notes.is_empty() {
            return Ok(vec![]);
        }
        let body = self
            .notes
            .iter()
            .map(|(author, note)| format!("{author}: {note}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(vec![ContextPart::SystemBlock {
            tag: "PLAYER_NOTES".into(),
            body,
        }])
    }
}

pub struct GameRulesProvider {
    /// House rules override; the default covers the table conventions.
    pub rules: Option<String>,
}

impl ContextProvider for GameRulesProvider {
    fn name(&self) -> &str {
        "game_rules"
    }

    fn contribute(&self, _input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        let body = self.rules.clone().unwrap_or_else(|| {
            "Checks use d20 + ability modifier against a difficulty class. \
             Typical DCs: easy 10, moderate 13, hard 16, heroic 20."
                .to_string()
        });
        Ok(vec![ContextPart::SystemBlock {
            tag: "GAME_RULES".into(),
            body,
        }])
    }
}

pub struct RecentHistoryProvider;

impl ContextProvider for RecentHistoryProvider {
    fn name(&self) -> &str {
        "recent_history"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        let mut parts = Vec::new();
        for turn in input.history {
            let user_text = turn
                .user_inputs
                .iter()
                .map(format_action)
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(ContextPart::Message(Message::user(if user_text.is_empty() {
                "(the party waits)".to_string()
            } else {
                user_text
            })));
            parts.push(ContextPart::Message(Message::assistant(
                turn.assistant_response.clone(),
            )));
        }
        Ok(parts)
    }
}

pub struct CurrentInputProvider;

impl ContextProvider for CurrentInputProvider {
    fn name(&self) -> &str {
        "current_input"
    }

    fn contribute(&self, input: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
        let body = if input.pending.is_empty() {
            "(No player actions this turn; advance the scene.)".to_string()
        } else {
            input
                .pending
                .iter()
                .map(format_action)
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(vec![ContextPart::Message(Message::user(format!(
            "[PLAYER_ACTIONS]\n{body}\n[/PLAYER_ACTIONS]"
        )))])
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use wyrd_model::Role;
    use wyrd_rules::Ability;
    use wyrd_state::ConversationTurn;

    use super::*;

    fn state() -> GameState {
        let mut gs = GameState::new("room-1");
        gs.location = "the mill bridge".into();
        let fighter = gs.character_mut("fighter");
        fighter.character_name = Some("Brunhilde".into());
        fighter.ability_modifiers.insert(Ability::Str, 3);
        gs
    }

    fn build(
        gs: &GameState,
        pending: &[PlayerAction],
        history: &[ConversationTurn],
    ) -> Vec<Message> {
        let prompts = PromptSet::builtin();
        let input = TurnInput {
            state: gs,
            pending,
            history,
            prompts: &prompts,
        };
        ContextBuilder::standard(vec![], None).build(&input).unwrap()
    }

    #[test]
    fn first_message_is_system_with_ordered_blocks() {
        let gs = state();
        let msgs = build(&gs, &[], &[]);
        let sys = msgs[0].as_text().unwrap();
        assert_eq!(msgs[0].role, Role::System);
        let prompt_pos = sys.find("[SYSTEM_PROMPT]").unwrap();
        let world_pos = sys.find("[WORLD_CONTEXT]").unwrap();
        let chars_pos = sys.find("[CHARACTER_PROFILES]").unwrap();
        let rules_pos = sys.find("[GAME_RULES]").unwrap();
        assert!(prompt_pos < world_pos && world_pos < chars_pos && chars_pos < rules_pos);
    }

    #[test]
    fn world_block_lists_facts_and_flags() {
        let mut gs = state();
        gs.world_context.push_fact("the bridge is out", 50);
        gs.world_context.set_flag("bridge_out", "true");
        let msgs = build(&gs, &[], &[]);
        let sys = msgs[0].as_text().unwrap();
        assert!(sys.contains("- the bridge is out"));
        assert!(sys.contains("- bridge_out = true"));
        assert!(sys.contains("Location: the mill bridge"));
    }

    #[test]
    fn character_profiles_show_modifiers() {
        let msgs = build(&state(), &[], &[]);
        let sys = msgs[0].as_text().unwrap();
        assert!(sys.contains("Brunhilde (fighter): HP 10, STR +3"));
    }

    #[test]
    fn module_block_only_when_module_set() {
        let mut gs = state();
        assert!(!build(&gs, &[], &[])[0].as_text().unwrap().contains("[MODULE_CONTEXT]"));
        gs.module_name = Some("The Sunken Keep".into());
        assert!(build(&gs, &[], &[])[0]
            .as_text()
            .unwrap()
            .contains("The Sunken Keep"));
    }

    #[test]
    fn current_actions_become_final_user_message() {
        let gs = state();
        let pending =
            vec![PlayerAction::new("alice", "alice", "I kick the door").with_character("fighter", "Brunhilde")];
        let msgs = build(&gs, &pending, &[]);
        let last = msgs.last().unwrap();
        assert_eq!(last.role, Role::User);
        let text = last.as_text().unwrap();
        assert!(text.contains("[PLAYER_ACTIONS]"));
        assert!(text.contains("alice (Brunhilde): I kick the door"));
    }

    #[test]
    fn empty_pending_still_produces_user_message() {
        let msgs = build(&state(), &[], &[]);
        let last = msgs.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.as_text().unwrap().contains("advance the scene"));
    }

    #[test]
    fn history_turns_become_user_assistant_pairs() {
        let gs = state();
        let history = vec![ConversationTurn::new(
            vec![PlayerAction::new("alice", "alice", "look around")],
            "You see a mill.",
            "exploration",
        )];
        let msgs = build(&gs, &[], &history);
        // system, history user, history assistant, current input
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[1].role, Role::User);
        assert!(msgs[1].as_text().unwrap().contains("look around"));
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[2].as_text(), Some("You see a mill."));
    }

    #[test]
    fn build_is_deterministic() {
        let gs = state();
        let a = build(&gs, &[], &[]);
        let b = build(&gs, &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn failing_provider_aborts_build() {
        struct Failing;
        impl ContextProvider for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn contribute(&self, _: &TurnInput<'_>) -> Result<Vec<ContextPart>, ContextError> {
                Err(ContextError {
                    provider: "failing".into(),
                    message: "no module file".into(),
                })
            }
        }
        let builder = ContextBuilder::new(vec![Box::new(Failing)]);
        let gs = state();
        let prompts = PromptSet::builtin();
        let input = TurnInput {
            state: &gs,
            pending: &[],
            history: &[],
            prompts: &prompts,
        };
        let err = builder.build(&input).unwrap_err();
        assert!(err.to_string().contains("failing"));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::PlayerAction;

/// Admission policy deciding when buffered actions advance the turn and
/// which characters may act next.
///
/// The gate is owned by the game session; the `restrict_action` tool may
/// stage a replacement that takes effect after the current turn ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnGate {
    /// Advance when every room member has a buffered action.
    AllPlayers,
    /// Only the named characters may act; advance when all of them have.
    Restricted {
        allowed_character_ids: BTreeSet<String>,
        reason: String,
    },
    /// Never advances; submissions are refused.
    Paused,
    /// Advance as soon as the named character has acted.
    Initiative { current_character_id: String },
}

impl TurnGate {
    /// May this action enter the buffer at all?
    pub fn can_act(&self, action: &PlayerAction) -> bool {
        match self {
            TurnGate::AllPlayers => true,
            TurnGate::Paused => false,
            TurnGate::Restricted {
                allowed_character_ids,
                ..
            } => action
                .character_id
                .as_deref()
                .map(|id| allowed_character_ids.contains(id))
                .unwrap_or(false),
            TurnGate::Initiative {
                current_character_id,
            } => action.character_id.as_deref() == Some(current_character_id.as_str()),
        }
    }

    /// Should the buffered actions advance the turn now?
    pub fn can_advance(&self, buffered: &[PlayerAction], member_count: usize) -> bool {
        match self {
            TurnGate::AllPlayers => {
                let distinct: BTreeSet<&str> =
                    buffered.iter().map(|a| a.user_id.as_str()).collect();
                member_count > 0 && distinct.len() >= member_count
            }
            TurnGate::Paused => false,
            TurnGate::Restricted {
                allowed_character_ids,
                ..
            } => {
                let acted: BTreeSet<&str> = buffered
                    .iter()
                    .filter_map(|a| a.character_id.as_deref())
                    .collect();
                !allowed_character_ids.is_empty()
                    && allowed_character_ids
                        .iter()
                        .all(|id| acted.contains(id.as_str()))
            }
            TurnGate::Initiative {
                current_character_id,
            } => buffered
                .iter()
                .any(|a| a.character_id.as_deref() == Some(current_character_id.as_str())),
        }
    }

    /// The characters currently allowed to act.  `None` means unrestricted.
    pub fn allowed_character_ids(&self) -> Option<BTreeSet<String>> {
        match self {
            TurnGate::AllPlayers => None,
            TurnGate::Paused => Some(BTreeSet::new()),
            TurnGate::Restricted {
                allowed_character_ids,
                ..
            } => Some(allowed_character_ids.clone()),
            TurnGate::Initiative {
                current_character_id,
            } => Some(BTreeSet::from([current_character_id.clone()])),
        }
    }

    pub fn description(&self) -> String {
        match self {
            TurnGate::AllPlayers => "waiting for all players".into(),
            TurnGate::Paused => "turns are paused".into(),
            TurnGate::Restricted { reason, .. } => format!("restricted: {reason}"),
            TurnGate::Initiative {
                current_character_id,
            } => format!("initiative: {current_character_id} to act"),
        }
    }
}

impl Default for TurnGate {
    fn default() -> Self {
        TurnGate::AllPlayers
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn action(user: &str, character: Option<&str>) -> PlayerAction {
        let a = PlayerAction::new(user, user, "does something");
        match character {
            Some(c) => a.with_character(c, c),
            None => a,
        }
    }

    // ── AllPlayers ────────────────────────────────────────────────────────────

    #[test]
    fn all_players_lets_anyone_act() {
        assert!(TurnGate::AllPlayers.can_act(&action("u1", None)));
    }

    #[test]
    fn all_players_waits_for_every_member() {
        let gate = TurnGate::AllPlayers;
        let one = vec![action("alice", Some("fighter"))];
        assert!(!gate.can_advance(&one, 2));
        let both = vec![action("alice", Some("fighter")), action("bob", Some("rogue"))];
        assert!(gate.can_advance(&both, 2));
    }

    #[test]
    fn all_players_counts_distinct_users_only() {
        let gate = TurnGate::AllPlayers;
        // Same user twice must not count as two members.
        let dup = vec![action("alice", None), action("alice", None)];
        assert!(!gate.can_advance(&dup, 2));
    }

    #[test]
    fn all_players_zero_members_never_advances() {
        assert!(!TurnGate::AllPlayers.can_advance(&[], 0));
    }

    // ── Paused ────────────────────────────────────────────────────────────────

    #[test]
    fn paused_refuses_everything() {
        let gate = TurnGate::Paused;
        assert!(!gate.can_act(&action("u1", Some("fighter"))));
        assert!(!gate.can_advance(&[action("u1", Some("fighter"))], 1));
        assert_eq!(gate.allowed_character_ids(), Some(BTreeSet::new()));
    }

    // ── Restricted ────────────────────────────────────────────────────────────

    fn restricted(ids: &[&str]) -> TurnGate {
        TurnGate::Restricted {
            allowed_character_ids: ids.iter().map(|s| s.to_string()).collect(),
            reason: "test".into(),
        }
    }

    #[test]
    fn restricted_refuses_unlisted_character() {
        let gate = restricted(&["rogue"]);
        assert!(!gate.can_act(&action("alice", Some("fighter"))));
        assert!(gate.can_act(&action("bob", Some("rogue"))));
    }

    #[test]
    fn restricted_refuses_characterless_action() {
        let gate = restricted(&["rogue"]);
        assert!(!gate.can_act(&action("alice", None)));
    }

    #[test]
    fn restricted_advances_when_all_allowed_have_acted() {
        let gate = restricted(&["rogue", "wizard"]);
        let partial = vec![action("bob", Some("rogue"))];
        assert!(!gate.can_advance(&partial, 3));
        let full = vec![action("bob", Some("rogue")), action("carol", Some("wizard"))];
        assert!(gate.can_advance(&full, 3));
    }

    #[test]
    fn restricted_empty_set_never_advances() {
        assert!(!restricted(&[]).can_advance(&[], 2));
    }

    // ── Initiative ────────────────────────────────────────────────────────────

    #[test]
    fn initiative_only_current_character_acts() {
        let gate = TurnGate::Initiative {
            current_character_id: "fighter".into(),
        };
        assert!(gate.can_act(&action("alice", Some("fighter"))));
        assert!(!gate.can_act(&action("bob", Some("rogue"))));
    }

    #[test]
    fn initiative_advances_after_current_acts() {
        let gate = TurnGate::Initiative {
            current_character_id: "fighter".into(),
        };
        assert!(!gate.can_advance(&[action("bob", Some("rogue"))], 2));
        assert!(gate.can_advance(&[action("alice", Some("fighter"))], 2));
    }

    // ── Descriptions ──────────────────────────────────────────────────────────

    #[test]
    fn descriptions_are_human_readable() {
        assert!(restricted(&["rogue"]).description().contains("restricted"));
        assert!(TurnGate::Paused.description().contains("paused"));
    }

    #[test]
    fn gate_serializes_with_kind_tag() {
        let json = serde_json::to_string(&restricted(&["rogue"])).unwrap();
        assert!(json.contains("\"kind\":\"restricted\""));
    }
}

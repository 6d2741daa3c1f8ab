// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use wyrd_state::StateKind;
use wyrd_tools::DiceRollReport;

/// Events emitted on a turn's outbound stream.
///
/// Consumers (client stream, history writer, extractor) subscribe to these.
/// The serde tag carries the wire names the serving layer forwards verbatim.
/// Every turn's stream ends with exactly one `TurnEnd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A narrative text chunk streamed from the dungeon master.
    #[serde(rename = "streaming-chunk")]
    NarrativeChunk { content: String },
    /// A resolved dice check.
    #[serde(rename = "dice-roll")]
    DiceRoll {
        #[serde(flatten)]
        report: DiceRollReport,
    },
    /// Only the listed characters may act on the next turn.
    #[serde(rename = "action-restriction")]
    ActionRestriction {
        allowed_character_ids: BTreeSet<String>,
        reason: String,
    },
    /// The game-state variant is changing.
    #[serde(rename = "state-transition")]
    StateTransition { from: StateKind, to: StateKind },
    /// The turn is over; always the final event.
    #[serde(rename = "turn-end")]
    TurnEnd,
}

impl SessionEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        SessionEvent::NarrativeChunk {
            content: content.into(),
        }
    }

    /// Narrative chunks are the only events a slow client may lose; they are
    /// coalescable.  Dice, restriction, transition, and turn-end events must
    /// always be delivered.
    pub fn is_coalescable(&self) -> bool {
        matches!(self, SessionEvent::NarrativeChunk { .. })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_serving_contract() {
        let cases = [
            (SessionEvent::chunk("x"), "streaming-chunk"),
            (SessionEvent::TurnEnd, "turn-end"),
            (
                SessionEvent::ActionRestriction {
                    allowed_character_ids: BTreeSet::from(["rogue".to_string()]),
                    reason: "stunned".into(),
                },
                "action-restriction",
            ),
            (
                SessionEvent::StateTransition {
                    from: StateKind::Exploration,
                    to: StateKind::Combat,
                },
                "state-transition",
            ),
        ];
        for (event, tag) in cases {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], tag, "wrong tag for {event:?}");
        }
    }

    #[test]
    fn dice_roll_flattens_report() {
        use wyrd_rules::RollOutcome;
        use wyrd_tools::CheckType;

        let event = SessionEvent::DiceRoll {
            report: DiceRollReport {
                check_type: CheckType::Ability,
                character_id: "fighter".into(),
                character_name: "Brunhilde".into(),
                ability: None,
                dc: Some(12),
                roll: RollOutcome {
                    formula: "1d20+3".into(),
                    rolls: vec![14],
                    modifier: 3,
                    total: 17,
                },
                success: true,
                reason: "Kicking door".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "dice-roll");
        assert_eq!(json["character_id"], "fighter");
        assert_eq!(json["roll"]["total"], 17);
    }

    #[test]
    fn only_narrative_is_coalescable() {
        assert!(SessionEvent::chunk("a").is_coalescable());
        assert!(!SessionEvent::TurnEnd.is_coalescable());
    }

    #[test]
    fn event_round_trips() {
        let e = SessionEvent::chunk("The rusted lock");
        let json = serde_json::to_string(&e).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::action::PlayerAction;
use crate::state::GameState;

/// Metadata recorded with each appended conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// The state variant that produced the turn ("exploration", …).
    pub turn_type: String,
    pub action_count: usize,
}

/// One completed turn: the drained player inputs and the assembled
/// assistant response.  Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_inputs: Vec<PlayerAction>,
    pub assistant_response: String,
    pub timestamp_ms: i64,
    pub metadata: TurnMetadata,
}

impl ConversationTurn {
    pub fn new(
        user_inputs: Vec<PlayerAction>,
        assistant_response: impl Into<String>,
        turn_type: impl Into<String>,
    ) -> Self {
        let action_count = user_inputs.len();
        Self {
            user_inputs,
            assistant_response: assistant_response.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
            metadata: TurnMetadata {
                turn_type: turn_type.into(),
                action_count,
            },
        }
    }
}

/// A persisted serialization of the room's `GameState`, keyed externally by
/// `(room_id, slot_name)`.  `history_len` records how many conversation
/// turns existed at save time; the turn log itself stays with the room
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub state: GameState,
    pub history_len: usize,
    pub saved_at_ms: i64,
}

impl GameSnapshot {
    pub fn of(state: &GameState, history_len: usize) -> Self {
        Self {
            state: state.clone(),
            history_len,
            saved_at_ms: Utc::now().timestamp_millis(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

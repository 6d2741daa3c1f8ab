// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One free-text action submitted by a player for the current turn.
///
/// Buffered by the action manager until the turn gate admits the turn;
/// the buffer keeps at most one action per `user_id` (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub user_id: String,
    pub username: String,
    pub character_id: Option<String>,
    pub character_name: Option<String>,
    pub action_text: String,
    pub timestamp_ms: i64,
}

impl PlayerAction {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        action_text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            character_id: None,
            character_name: None,
            action_text: action_text.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_character(
        mut self,
        character_id: impl Into<String>,
        character_name: impl Into<String>,
    ) -> Self {
        self.character_id = Some(character_id.into());
        self.character_name = Some(character_name.into());
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

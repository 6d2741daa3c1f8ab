// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use tracing::debug;

/// The dungeon-master system prompt used when no override file exists.
const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the dungeon master of a cooperative tabletop role-playing game. \
Several players act at once; weave their actions into one coherent scene and \
answer in vivid second-person narration.

Rules of the table:
- When the outcome of an action is uncertain, call `request_ability_check` \
(or `request_saving_throw` when a character resists an effect) instead of \
deciding yourself. Use `request_group_check` when the whole party attempts \
the same thing.
- When the fiction prevents some characters from acting, call \
`restrict_action` with the characters that still can.
- When violence breaks out, call `start_combat` with a short encounter brief.
- Never reveal dice mechanics in prose; describe outcomes narratively.
- Keep each turn to a few paragraphs and end at a point where the players \
can react.";

/// The distilled prompt for the post-turn world-context extraction call.
const DEFAULT_STATUS_UPDATE: &str = "\
You distill one game turn into memory items for the dungeon master. \
Read the player actions and the narration, then output ONLY a YAML list. \
Each item is one of:

- type: LT
  content: <a lasting fact about the world (places, deaths, alliances)>
- type: ST
  content: <a recent event that matters for the next few scenes>
- type: flag
  key: <snake_case_key>
  value: <short value>

Output 0 to 6 items. No prose outside the YAML list.";

/// The prompt pair the engine needs: the DM system prompt and the
/// extractor's status-update prompt.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system_prompt: String,
    pub status_update: String,
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            status_update: DEFAULT_STATUS_UPDATE.to_string(),
        }
    }

    /// Load prompts from `prompt_dir`, falling back to the embedded defaults
    /// per file (`system_prompt.md`, `status_update.md`).
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let mut prompts = Self::builtin();
        let Some(dir) = prompt_dir else {
            return prompts;
        };
        if let Some(text) = read_override(dir, "system_prompt.md") {
            prompts.system_prompt = text;
        }
        if let Some(text) = read_override(dir, "status_update.md") {
            prompts.status_update = text;
        }
        prompts
    }
}

fn read_override(dir: &Path, file: &str) -> Option<String> {
    let path = dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), "loaded prompt override");
            Some(text.trim_end().to_string())
        }
        _ => None,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

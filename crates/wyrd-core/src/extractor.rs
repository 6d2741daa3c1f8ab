// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Post-turn world-context extraction.
//!
//! After a turn ends, a second model call distills the turn's inputs and
//! narration into classified memory items: `LT` entries become world facts,
//! `ST` entries become recent events, `flag` entries update the flag map.
//! The model is asked for a YAML list; JSON is accepted too since YAML is a
//! superset.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use wyrd_model::{ChatRequest, Message, ModelError, ModelProvider};
use wyrd_state::{PlayerAction, WorldContext};

use crate::prompts::PromptSet;

/// One classified memory item from the extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryItem {
    /// Lasting fact → `world_facts`.
    LongTerm(String),
    /// Recent event → `recent_events`.
    ShortTerm(String),
    /// Flag update → `flags`.
    Flag { key: String, value: String },
}

#[derive(Clone)]
pub struct WorldContextExtractor {
    model: Arc<dyn ModelProvider>,
    prompts: Arc<PromptSet>,
    timeout_seconds: u64,
}

impl WorldContextExtractor {
    pub fn new(model: Arc<dyn ModelProvider>, prompts: Arc<PromptSet>, timeout_seconds: u64) -> Self {
        Self {
            model,
            prompts,
            timeout_seconds,
        }
    }

    /// Run the `status_update` call over one finished turn.
    pub async fn extract(
        &self,
        user_inputs: &[PlayerAction],
        assistant_text: &str,
    ) -> Result<Vec<MemoryItem>, ModelError> {
        let mut transcript = String::from("Player actions:\n");
        if user_inputs.is_empty() {
            transcript.push_str("(none)\n");
        }
        for a in user_inputs {
            transcript.push_str(&format!("- {}: {}\n", a.username, a.action_text));
        }
        transcript.push_str("\nDungeon master narration:\n");
        transcript.push_str(assistant_text);

        let req = ChatRequest {
            messages: vec![
                Message::system(self.prompts.status_update.clone()),
                Message::user(transcript),
            ],
            ..Default::default()
        };
        let resp = timeout(
            Duration::from_secs(self.timeout_seconds.max(1)),
            self.model.chat(req),
        )
        .await
        .map_err(|_| ModelError::Timeout(self.timeout_seconds))??;

        Ok(parse_memory_items(&resp.content))
    }
}

/// Apply extracted items under the FIFO caps.
pub fn apply_items(
    world: &mut WorldContext,
    items: Vec<MemoryItem>,
    events_cap: usize,
    facts_cap: usize,
) {
    for item in items {
        match item {
            MemoryItem::LongTerm(fact) => world.push_fact(fact, facts_cap),
            MemoryItem::ShortTerm(event) => world.push_event(event, events_cap),
            MemoryItem::Flag { key, value } => world.set_flag(key, value),
        }
    }
}

/// Parse the model's memory-item list.  Tolerates markdown code fences and
/// JSON output; anything unparseable yields an empty list (the turn already
/// succeeded, extraction is best-effort).
pub fn parse_memory_items(text: &str) -> Vec<MemoryItem> {
    let cleaned = strip_code_fences(text);
    let value: serde_yaml::Value = match serde_yaml::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable extractor output: {e}");
            return Vec::new();
        }
    };
    let Some(seq) = value.as_sequence() else {
        warn!("extractor output is not a list");
        return Vec::new();
    };

    let mut items = Vec::new();
    for entry in seq {
        let kind = entry
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_ascii_uppercase();
        match kind.as_str() {
            "LT" => {
                if let Some(content) = scalar_string(entry.get("content")) {
                    items.push(MemoryItem::LongTerm(content));
                }
            }
            "ST" => {
                if let Some(content) = scalar_string(entry.get("content")) {
                    items.push(MemoryItem::ShortTerm(content));
                }
            }
            "FLAG" => {
                if let (Some(key), Some(value)) =
                    (scalar_string(entry.get("key")), scalar_string(entry.get("value")))
                {
                    items.push(MemoryItem::Flag { key, value });
                }
            }
            other => {
                warn!("skipping memory item with unknown type '{other}'");
            }
        }
    }
    items
}

/// Stringify a YAML scalar: bare `true` / `12` from the model are accepted
/// as flag values.
fn scalar_string(v: Option<&serde_yaml::Value>) -> Option<String> {
    match v? {
        serde_yaml::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("yaml", "json") up to the first newline.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    800
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_tool_rounds() -> u32 {
    5
}

fn default_history_recent_turns() -> usize {
    5
}

fn default_recent_events_cap() -> usize {
    12
}

fn default_facts_cap() -> usize {
    50
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Directory holding prompt overrides (`system_prompt.md`,
    /// `status_update.md`).  Embedded defaults are used when unset or when a
    /// file is missing.
    #[serde(default)]
    pub prompt_dir: Option<String>,
    /// Directory for room documents and snapshots.
    /// Defaults to the platform data dir (`~/.local/share/wyrd`).
    #[serde(default)]
    pub data_dir: Option<String>,
}

/// Model settings forwarded to the LLM driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Driver identifier: "openai-compat" (any `/chat/completions` endpoint)
    /// or "mock" (deterministic, offline).
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files.
    pub api_key: Option<String>,
    /// Base URL ending before `/chat/completions`,
    /// e.g. `https://api.openai.com/v1` or `http://localhost:11434/v1`.
    pub base_url: Option<String>,
    /// Sampling temperature (0.0–2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to request in a single completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call timeout.  Expiry loses the turn; the engine does not retry.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compat".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Turn-engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tool-call rounds per turn before the step-limit chunk is emitted.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Conversation turns included in the LLM context.
    #[serde(default = "default_history_recent_turns")]
    pub history_recent_turns: usize,
    /// FIFO cap on `worldContext.recentEvents`.
    #[serde(default = "default_recent_events_cap")]
    pub world_recent_events_cap: usize,
    /// FIFO cap on `worldContext.worldFacts`.
    #[serde(default = "default_facts_cap")]
    pub world_facts_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            history_recent_turns: default_history_recent_turns(),
            world_recent_events_cap: default_recent_events_cap(),
            world_facts_cap: default_facts_cap(),
        }
    }
}

impl Config {
    /// Apply environment-variable overrides on top of file-loaded values.
    ///
    /// Unparseable numeric values are ignored with a warning rather than
    /// failing startup.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            match v.parse::<f32>() {
                Ok(t) if (0.0..=2.0).contains(&t) => self.llm.temperature = t,
                _ => tracing::warn!(value = %v, "ignoring invalid LLM_TEMPERATURE"),
            }
        }
        if let Ok(v) = std::env::var("LLM_MAX_TOKENS") {
            match v.parse() {
                Ok(n) => self.llm.max_tokens = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid LLM_MAX_TOKENS"),
            }
        }
        if let Ok(v) = std::env::var("LLM_TIMEOUT_SECONDS") {
            match v.parse() {
                Ok(n) => self.llm.timeout_seconds = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid LLM_TIMEOUT_SECONDS"),
            }
        }
        if let Ok(v) = std::env::var("MAX_TOOL_ROUNDS") {
            match v.parse() {
                Ok(n) => self.engine.max_tool_rounds = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid MAX_TOOL_ROUNDS"),
            }
        }
        if let Ok(v) = std::env::var("HISTORY_RECENT_TURNS") {
            match v.parse() {
                Ok(n) => self.engine.history_recent_turns = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid HISTORY_RECENT_TURNS"),
            }
        }
        if let Ok(v) = std::env::var("WORLD_RECENT_EVENTS_CAP") {
            match v.parse() {
                Ok(n) => self.engine.world_recent_events_cap = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid WORLD_RECENT_EVENTS_CAP"),
            }
        }
        if let Ok(v) = std::env::var("WORLD_FACTS_CAP") {
            match v.parse() {
                Ok(n) => self.engine.world_facts_cap = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid WORLD_FACTS_CAP"),
            }
        }
        if let Ok(v) = std::env::var("WYRD_PROMPT_DIR") {
            self.prompt_dir = Some(v);
        }
        if let Ok(v) = std::env::var("WYRD_DATA_DIR") {
            self.data_dir = Some(v);
        }
    }

    /// Resolve `prompt_dir` with `~` and `$VAR` expansion.
    pub fn resolved_prompt_dir(&self) -> Option<std::path::PathBuf> {
        self.prompt_dir
            .as_deref()
            .map(|p| std::path::PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    /// Resolve `data_dir`, falling back to the platform data directory.
    pub fn resolved_data_dir(&self) -> std::path::PathBuf {
        if let Some(p) = self.data_dir.as_deref() {
            return std::path::PathBuf::from(shellexpand::tilde(p).into_owned());
        }
        dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("wyrd")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.llm.temperature, 0.7);
        assert_eq!(cfg.llm.max_tokens, 800);
        assert_eq!(cfg.llm.timeout_seconds, 60);
        assert_eq!(cfg.engine.max_tool_rounds, 5);
        assert_eq!(cfg.engine.history_recent_turns, 5);
        assert_eq!(cfg.engine.world_recent_events_cap, 12);
        assert_eq!(cfg.engine.world_facts_cap, 50);
    }

    #[test]
    fn empty_yaml_deserializes_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.engine.max_tool_rounds, 5);
        assert_eq!(cfg.llm.provider, "openai-compat");
    }

    #[test]
    fn partial_llm_section_keeps_other_defaults() {
        let cfg: Config = serde_yaml::from_str("llm:\n  provider: mock\n  model: scripted").unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.model, "scripted");
        assert_eq!(cfg.llm.max_tokens, 800);
    }

    #[test]
    fn env_override_model_wins() {
        std::env::set_var("LLM_MODEL", "llama3.2");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        std::env::remove_var("LLM_MODEL");
        assert_eq!(cfg.llm.model, "llama3.2");
    }

    #[test]
    fn env_override_rejects_out_of_range_temperature() {
        std::env::set_var("LLM_TEMPERATURE", "9.5");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        std::env::remove_var("LLM_TEMPERATURE");
        assert_eq!(cfg.llm.temperature, 0.7);
    }

    #[test]
    fn env_override_engine_caps() {
        std::env::set_var("WORLD_FACTS_CAP", "99");
        std::env::set_var("MAX_TOOL_ROUNDS", "3");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        std::env::remove_var("WORLD_FACTS_CAP");
        std::env::remove_var("MAX_TOOL_ROUNDS");
        assert_eq!(cfg.engine.world_facts_cap, 99);
        assert_eq!(cfg.engine.max_tool_rounds, 3);
    }

    #[test]
    fn resolved_data_dir_uses_explicit_path() {
        let cfg = Config {
            data_dir: Some("/tmp/wyrd-test-data".into()),
            ..Config::default()
        };
        assert_eq!(
            cfg.resolved_data_dir(),
            std::path::PathBuf::from("/tmp/wyrd-test-data")
        );
    }
}

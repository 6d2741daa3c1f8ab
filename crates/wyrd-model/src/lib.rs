// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use error::ModelError;
pub use mock::{ScriptedModelProvider, ScriptedReply};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ModelProvider, StreamHandle};
pub use types::*;

use std::sync::Arc;

use wyrd_config::LlmConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Recognised drivers:
/// - `"openai-compat"` — any endpoint speaking the `/chat/completions` wire
///   format (OpenAI, OpenRouter, Ollama, vLLM, llama.cpp, …)
/// - `"mock"` — deterministic offline provider (echoes the last user line)
pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let api_key = cfg
        .api_key
        .clone()
        .or_else(|| cfg.api_key_env.as_deref().and_then(|v| std::env::var(v).ok()));

    match cfg.provider.as_str() {
        "openai-compat" => Ok(Arc::new(OpenAiCompatProvider::new(
            cfg.model.clone(),
            api_key,
            cfg.base_url.as_deref().unwrap_or("https://api.openai.com/v1"),
            cfg.max_tokens,
            cfg.temperature,
            cfg.timeout_seconds,
        ))),
        "mock" => Ok(Arc::new(ScriptedModelProvider::echo())),
        other => anyhow::bail!("unknown llm provider '{other}' (expected openai-compat or mock)"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_builds_openai_compat() {
        let cfg = LlmConfig {
            provider: "openai-compat".into(),
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        let p = from_config(&cfg).unwrap();
        assert_eq!(p.name(), "openai-compat");
    }

    #[test]
    fn from_config_builds_mock() {
        let cfg = LlmConfig {
            provider: "mock".into(),
            ..LlmConfig::default()
        };
        let p = from_config(&cfg).unwrap();
        assert_eq!(p.name(), "mock");
    }

    #[test]
    fn from_config_rejects_unknown_driver() {
        let cfg = LlmConfig {
            provider: "tarot-cards".into(),
            ..LlmConfig::default()
        };
        assert!(from_config(&cfg).is_err());
    }
}

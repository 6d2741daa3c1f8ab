// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Failures surfaced by a model driver.
///
/// The engine maps these onto user-facing synthetic narrative ("(LLM
/// timeout)") and never retries at this layer; retry policy belongs to
/// callers.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Network-level failure: DNS, connect, TLS, 5xx, broken stream.
    #[error("llm transport error: {0}")]
    Transport(String),
    /// The per-call deadline elapsed.
    #[error("llm call timed out after {0}s")]
    Timeout(u64),
    /// The request was rejected as malformed (4xx, bad tool schema, …).
    #[error("llm rejected request: {0}")]
    Request(String),
}

impl ModelError {
    /// Classify a reqwest error: timeouts keep their own variant so the
    /// engine can emit the dedicated timeout chunk.
    pub fn from_http(err: reqwest::Error, timeout_seconds: u64) -> Self {
        if err.is_timeout() {
            ModelError::Timeout(timeout_seconds)
        } else {
            ModelError::Transport(err.to_string())
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

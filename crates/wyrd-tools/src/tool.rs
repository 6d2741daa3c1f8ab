// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use serde_json::Value;
use wyrd_state::GameState;

/// Room state shared with the tools.  Tools lock briefly during execution;
/// the turn executor owns all longer-lived mutation.
pub type SharedGameState = Arc<tokio::sync::Mutex<GameState>>;

/// Injected RNG so dice outcomes are deterministic under a fixed seed.
pub type SharedRng = Arc<std::sync::Mutex<StdRng>>;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// The result of executing a tool, rendered back to the model.
///
/// Failures are non-fatal by construction: a tool that cannot run returns
/// `is_error = true` with a message the model can react to, and the turn
/// continues.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait every game tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters.
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_output_is_not_error() {
        let out = ToolOutput::ok("c1", "done");
        assert!(!out.is_error);
        assert_eq!(out.call_id, "c1");
        assert_eq!(out.content, "done");
    }

    #[test]
    fn err_output_is_error() {
        let out = ToolOutput::err("c2", "unknown character 'ghost'");
        assert!(out.is_error);
        assert!(out.content.contains("ghost"));
    }
}

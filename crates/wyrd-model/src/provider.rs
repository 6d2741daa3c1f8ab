// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{ChatRequest, ChatResponse, ModelError, StreamEvent};

pub type StreamHandle = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

/// The LLM port consumed by the turn engine.
///
/// Two operations mirror the two call styles the engine uses: a buffered
/// `chat` for tool-calling rounds and a lazy `stream_chat` for first-round
/// narrative.  Drivers whose streaming path cannot carry tool calls should
/// return `false` from `supports_streaming`; the engine then uses `chat`
/// throughout.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Driver identifier for logs and status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Whether `stream_chat` is a real streaming implementation.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Send a completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Send a completion request and return a lazy event stream.
    ///
    /// The default adapts `chat`: one delta with the full content, the tool
    /// calls, then `Done`.  Streaming drivers override this.
    async fn stream_chat(&self, req: ChatRequest) -> Result<StreamHandle, ModelError> {
        let resp = self.chat(req).await?;
        let mut events: Vec<Result<StreamEvent, ModelError>> = Vec::new();
        if !resp.content.is_empty() {
            events.push(Ok(StreamEvent::TextDelta(resp.content)));
        }
        for (i, tc) in resp.tool_calls.into_iter().enumerate() {
            events.push(Ok(StreamEvent::ToolCall {
                index: i as u32,
                id: tc.id,
                name: tc.name,
                arguments: tc.arguments,
            }));
        }
        events.push(Ok(StreamEvent::Done));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

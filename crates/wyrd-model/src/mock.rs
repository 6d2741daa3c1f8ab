// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::StreamHandle;
use crate::{
    ChatRequest, ChatResponse, MessageContent, ModelError, ModelProvider, Role, StreamEvent,
    ToolCallRequest,
};

/// One scripted model reply: text deltas plus optional tool calls.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReply {
    pub deltas: Vec<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Pause before each streamed event.  Lets cancellation tests interleave
    /// deterministically with stream consumption.
    pub delay_ms: u64,
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            deltas: vec![content.into()],
            ..Default::default()
        }
    }

    pub fn stream(deltas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCallRequest {
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }

    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.tool_calls.push(ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A pre-scripted mock provider.  Each `chat` / `stream_chat` call pops the
/// next reply from the front of the queue, so tests specify exact event
/// sequences — including tool calls — without network access.
///
/// When the queue is exhausted (or in `echo` mode) the provider echoes the
/// last user message, which keeps multi-round loops from hanging.
pub struct ScriptedModelProvider {
    scripts: Arc<Mutex<Vec<ScriptedReply>>>,
    /// The last `ChatRequest` seen by this provider.  Written on each call so
    /// tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<ChatRequest>>>,
    streaming: bool,
}

impl ScriptedModelProvider {
    pub fn new(scripts: Vec<ScriptedReply>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            streaming: true,
        }
    }

    /// Provider with no scripts: every call echoes the last user message.
    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    /// Convenience: one plain text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::text(reply)])
    }

    /// Convenience: a tool-call round followed by a text round.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ScriptedReply::tool_call(tool_id, tool_name, args_json),
            ScriptedReply::text(final_text),
        ])
    }

    /// Declare that this mock has no real streaming path, forcing the engine
    /// down the chat-only fallback.
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// How many scripted replies are still queued.  Lets tests prove that a
    /// code path did (or did not) reach the model.
    pub fn remaining_scripts(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    fn next_reply(&self, req: &ChatRequest) -> ScriptedReply {
        *self.last_request.lock().unwrap() = Some(req.clone());
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            let reply = req
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .and_then(|m| match &m.content {
                    MessageContent::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .unwrap_or("[no input]");
            ScriptedReply::text(format!("MOCK: {reply}"))
        } else {
            scripts.remove(0)
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedModelProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "scripted-mock"
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let reply = self.next_reply(&req);
        Ok(ChatResponse {
            content: reply.deltas.concat(),
            tool_calls: reply.tool_calls,
            usage: None,
        })
    }

    async fn stream_chat(&self, req: ChatRequest) -> Result<StreamHandle, ModelError> {
        let reply = self.next_reply(&req);
        let mut events: Vec<StreamEvent> = reply
            .deltas
            .into_iter()
            .map(StreamEvent::TextDelta)
            .collect();
        for (i, tc) in reply.tool_calls.into_iter().enumerate() {
            events.push(StreamEvent::ToolCall {
                index: i as u32,
                id: tc.id,
                name: tc.name,
                arguments: tc.arguments,
            });
        }
        events.push(StreamEvent::Done);

        let delay = reply.delay_ms;
        let stream = futures::stream::unfold(events.into_iter(), move |mut it| async move {
            let ev = it.next()?;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Some((Ok(ev), it))
        });
        Ok(Box::pin(stream))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::Message;

    fn req(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn echo_replies_with_last_user_message() {
        let p = ScriptedModelProvider::echo();
        let resp = p.chat(req("hello there")).await.unwrap();
        assert_eq!(resp.content, "MOCK: hello there");
    }

    #[tokio::test]
    async fn scripted_replies_pop_in_order() {
        let p = ScriptedModelProvider::new(vec![
            ScriptedReply::text("first"),
            ScriptedReply::text("second"),
        ]);
        assert_eq!(p.chat(req("a")).await.unwrap().content, "first");
        assert_eq!(p.chat(req("b")).await.unwrap().content, "second");
        // Exhausted: falls back to echo.
        assert_eq!(p.chat(req("c")).await.unwrap().content, "MOCK: c");
    }

    #[tokio::test]
    async fn stream_yields_deltas_then_done() {
        let p = ScriptedModelProvider::new(vec![ScriptedReply::stream(["The rusted lock", "rattles. "])]);
        let mut stream = p.stream_chat(req("kick the door")).await.unwrap();
        let mut texts = Vec::new();
        while let Some(ev) = stream.next().await {
            match ev.unwrap() {
                StreamEvent::TextDelta(t) => texts.push(t),
                StreamEvent::Done => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(texts, vec!["The rusted lock", "rattles. "]);
    }

    #[tokio::test]
    async fn stream_carries_tool_calls_after_text() {
        let p = ScriptedModelProvider::new(vec![ScriptedReply::stream(["hm. "]).with_tool_call(
            "c1",
            "request_ability_check",
            r#"{"dc":12}"#,
        )]);
        let mut stream = p.stream_chat(req("x")).await.unwrap();
        let mut saw_tool = false;
        while let Some(ev) = stream.next().await {
            if let StreamEvent::ToolCall { name, .. } = ev.unwrap() {
                assert_eq!(name, "request_ability_check");
                saw_tool = true;
            }
        }
        assert!(saw_tool);
    }

    #[tokio::test]
    async fn last_request_captured() {
        let p = ScriptedModelProvider::always_text("ok");
        let _ = p.chat(req("inspect me")).await.unwrap();
        let captured = p.last_request.lock().unwrap().take().unwrap();
        assert_eq!(captured.messages[0].as_text(), Some("inspect me"));
    }
}

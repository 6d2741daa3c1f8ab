// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Driver for OpenAI-compatible chat completion APIs.
//!
//! Dozens of providers speak the same `/chat/completions` wire format
//! (OpenAI, OpenRouter, Groq, Ollama, vLLM, llama.cpp).  One driver covers
//! them all; only the base URL and key differ.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::StreamHandle;
use crate::{
    ChatRequest, ChatResponse, Message, MessageContent, ModelError, ModelProvider, Role,
    StreamEvent, ToolCallRequest, ToolChoice, Usage,
};

pub struct OpenAiCompatProvider {
    model: String,
    /// Pre-resolved key; `None` for local servers that need no auth.
    api_key: Option<String>,
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    timeout_seconds: u64,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: u32,
        temperature: f32,
        timeout_seconds: u64,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens,
            temperature,
            timeout_seconds,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages = build_wire_messages(&req.messages);
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
            "temperature": req.temperature.unwrap_or(self.temperature),
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!(match req.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::Required => "required",
                ToolChoice::None => "none",
            });
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let mut http = self.client.post(&self.chat_url).json(body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let resp = http
            .send()
            .await
            .map_err(|e| ModelError::from_http(e, self.timeout_seconds))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                ModelError::Request(format!("{status}: {text}"))
            } else {
                ModelError::Transport(format!("{status}: {text}"))
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let body = self.build_body(&req, false);
        debug!(model = %self.model, messages = req.messages.len(), tools = req.tools.len(),
            "sending completion request");
        let resp = self.send(&body).await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::from_http(e, self.timeout_seconds))?;
        Ok(parse_chat_response(&v))
    }

    async fn stream_chat(&self, req: ChatRequest) -> Result<StreamHandle, ModelError> {
        let body = self.build_body(&req, true);
        debug!(model = %self.model, messages = req.messages.len(),
            "sending streaming completion request");
        let resp = self.send(&body).await?;
        let timeout_seconds = self.timeout_seconds;

        let byte_stream = resp.bytes_stream();
        // SSE events can be split across TCP packets.  Maintain a line
        // buffer across chunks; emit events only for complete lines.
        let event_stream = byte_stream
            .scan(String::new(), move |buf, chunk| {
                let events: Vec<Result<StreamEvent, ModelError>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ModelError::from_http(e, timeout_seconds))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

// ─── Wire format helpers ──────────────────────────────────────────────────────

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Serialize messages into the `/chat/completions` shape.  Tool calls become
/// the assistant `tool_calls` array; tool results become `role: "tool"`
/// messages referencing the call id.
fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match &m.content {
            MessageContent::Text(t) => json!({
                "role": role_str(&m.role),
                "content": t,
            }),
            MessageContent::ToolCall {
                tool_call_id,
                function,
            } => json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": [{
                    "id": tool_call_id,
                    "type": "function",
                    "function": {
                        "name": function.name,
                        "arguments": function.arguments,
                    }
                }]
            }),
            MessageContent::ToolResult {
                tool_call_id,
                content,
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        })
        .collect()
}

fn parse_chat_response(v: &Value) -> ChatResponse {
    let message = &v["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let name = c["function"]["name"].as_str()?;
                    Some(ToolCallRequest {
                        id: c["id"].as_str().unwrap_or_default().to_string(),
                        name: name.to_string(),
                        arguments: c["function"]["arguments"]
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let usage = v.get("usage").map(|u| Usage {
        input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
    });
    ChatResponse {
        content,
        tool_calls,
        usage,
    }
}

/// Parse a single complete SSE `data:` line into a [`StreamEvent`].
///
/// Returns `None` for empty lines, comment lines, or unparseable data.
fn parse_sse_data_line(line: &str) -> Option<Result<StreamEvent, ModelError>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(StreamEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    parse_sse_chunk(&v)
}

fn parse_sse_chunk(v: &Value) -> Option<Result<StreamEvent, ModelError>> {
    if let Some(err) = v.get("error") {
        return Some(Ok(StreamEvent::Error(err.to_string())));
    }
    let delta = &v["choices"][0]["delta"];
    if let Some(tcs) = delta["tool_calls"].as_array() {
        // One chunk carries at most one tool-call fragment in practice;
        // take the first and let the caller accumulate by index.
        let c = tcs.first()?;
        return Some(Ok(StreamEvent::ToolCall {
            index: c["index"].as_u64().unwrap_or(0) as u32,
            id: c["id"].as_str().unwrap_or_default().to_string(),
            name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
            arguments: c["function"]["arguments"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        }));
    }
    let text = delta["content"].as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(Ok(StreamEvent::TextDelta(text.to_string())))
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so it can be extended by
/// the next TCP chunk.
fn drain_complete_sse_lines(buf: &mut String) -> Vec<Result<StreamEvent, ModelError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

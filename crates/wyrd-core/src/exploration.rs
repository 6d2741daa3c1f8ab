// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The exploration state's model ↔ tool loop.
//!
//! One call per round: the first round streams narrative when the driver
//! supports it, later rounds use buffered chat so tool results can be fed
//! back.  Tool calls execute sequentially in the order the model returned
//! them — results may touch shared character state, and providers expect
//! serial tool-result messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

use wyrd_config::Config;
use wyrd_model::{
    ChatRequest, Message, ModelError, ModelProvider, StreamEvent, ToolCallRequest, ToolChoice,
};
use wyrd_state::{StateKind, TurnGate};
use wyrd_tools::{ToolCall, ToolEffect, ToolOutput, ToolRegistry};

use crate::events::SessionEvent;

/// Synthetic chunk emitted when the round cap cuts a turn short.
pub const STEP_LIMIT_NOTICE: &str = "(turn ended due to step limit)";
/// Synthetic chunk emitted when a model call times out.
pub const TIMEOUT_NOTICE: &str = "(LLM timeout)";

/// What the turn loop reports back to the session for post-turn staging.
#[derive(Debug, Default)]
pub struct TurnReport {
    pub cancelled: bool,
    /// A model failure (transport, timeout) lost the turn; only the
    /// synthetic notice was emitted.
    pub failed: bool,
    /// The round cap ended the turn early.
    pub truncated: bool,
    /// Gate replacement staged by `restrict_action`, applied at turn end.
    pub staged_gate: Option<TurnGate>,
    /// State transition staged by `start_combat`, applied at turn end.
    pub staged_transition: Option<StateKind>,
    /// Encounter brief accompanying a staged combat transition.
    pub encounter_brief: Option<String>,
}

enum RoundOutcome {
    Completed {
        text: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    Cancelled,
    /// Notice text for the synthetic narrative chunk.
    Failed(String),
}

/// One turn's worth of loop state.  Constructed by the session with the
/// room's model, registry, and the receiving end of the tool effect channel.
pub struct ExplorationTurn<'a> {
    pub model: &'a Arc<dyn ModelProvider>,
    pub tools: &'a ToolRegistry,
    pub effects_rx: &'a mut mpsc::Receiver<ToolEffect>,
    pub config: &'a Config,
    pub room_id: &'a str,
    pub turn_no: u64,
    pub kind: StateKind,
}

impl ExplorationTurn<'_> {
    /// Run the loop over `messages`, emitting session events on `tx`.
    ///
    /// Exactly one `TurnEnd` is emitted on every path, including
    /// cancellation and model failure.  When the sender half of `cancel` is
    /// dropped or fired, the loop stops at the next event boundary.
    pub async fn run(
        mut self,
        mut messages: Vec<Message>,
        tx: &mpsc::Sender<SessionEvent>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> TurnReport {
        let mut report = TurnReport::default();
        let tool_schemas: Vec<wyrd_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| wyrd_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();
        let max_rounds = self.config.engine.max_tool_rounds.max(1);
        let mut finished = false;

        for round in 1..=max_rounds {
            // Dropped sender counts as cancellation too: `try_recv` returns
            // Closed then, which a plain `.is_ok()` check would miss.
            match cancel.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {}
                _ => {
                    report.cancelled = true;
                    let _ = tx.send(SessionEvent::TurnEnd).await;
                    return report;
                }
            }

            let deadline =
                Instant::now() + Duration::from_secs(self.config.llm.timeout_seconds.max(1));

            // Streaming is a latency optimisation for the narrative-only
            // first round; every later round needs buffered tool calls.
            let outcome = if round == 1 && self.model.supports_streaming() {
                self.stream_round(&messages, &tool_schemas, tx, cancel, deadline)
                    .await
            } else {
                self.chat_round(&messages, &tool_schemas, tx, cancel, deadline)
                    .await
            };

            let tool_calls = match outcome {
                RoundOutcome::Completed { text, tool_calls } => {
                    if !text.is_empty() {
                        messages.push(Message::assistant(&text));
                    }
                    tool_calls
                }
                RoundOutcome::Cancelled => {
                    report.cancelled = true;
                    let _ = tx.send(SessionEvent::TurnEnd).await;
                    return report;
                }
                RoundOutcome::Failed(notice) => {
                    report.failed = true;
                    let _ = tx.send(SessionEvent::chunk(notice)).await;
                    let _ = tx.send(SessionEvent::TurnEnd).await;
                    return report;
                }
            };

            if tool_calls.is_empty() {
                finished = true;
                break;
            }

            // Phase 1: all assistant tool-call messages precede any result
            // (the provider wire format requires the pairing in this order).
            for tc in &tool_calls {
                messages.push(Message::tool_call(&tc.id, &tc.name, &tc.arguments));
            }

            // Phase 2: execute sequentially in the order the model returned.
            for tc in &tool_calls {
                let output = match serde_json::from_str::<Value>(&tc.arguments) {
                    Ok(args) => {
                        self.tools
                            .execute(&ToolCall {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                args,
                            })
                            .await
                    }
                    Err(e) => ToolOutput::err(&tc.id, format!("invalid arguments: {e}")),
                };
                self.drain_effects(tx, &mut report).await;

                let content = if output.is_error {
                    warn!(room_id = %self.room_id, turn = self.turn_no, tool = %tc.name,
                        "tool error: {}", output.content);
                    json!({ "error": output.content }).to_string()
                } else {
                    output.content
                };
                messages.push(Message::tool_result(&tc.id, content));
            }
        }

        if !finished {
            // Round cap reached with the model still asking for tools.
            report.truncated = true;
            let _ = tx.send(SessionEvent::chunk(STEP_LIMIT_NOTICE)).await;
        }
        let _ = tx.send(SessionEvent::TurnEnd).await;
        report
    }

    async fn stream_round(
        &mut self,
        messages: &[Message],
        tools: &[wyrd_model::ToolSchema],
        tx: &mpsc::Sender<SessionEvent>,
        cancel: &mut oneshot::Receiver<()>,
        deadline: Instant,
    ) -> RoundOutcome {
        let req = ChatRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: ToolChoice::Auto,
            ..Default::default()
        };

        let mut stream = tokio::select! {
            biased;
            _ = &mut *cancel => return RoundOutcome::Cancelled,
            res = timeout_at(deadline, self.model.stream_chat(req)) => match res {
                Err(_) => return RoundOutcome::Failed(self.failure_notice(&ModelError::Timeout(
                    self.config.llm.timeout_seconds))),
                Ok(Err(e)) => return RoundOutcome::Failed(self.failure_notice(&e)),
                Ok(Ok(s)) => s,
            },
        };

        let mut text = String::new();
        // Keyed by the parallel-tool-call index from the driver: chunks for
        // different calls may interleave.
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut *cancel => return RoundOutcome::Cancelled,
                ev = timeout_at(deadline, stream.next()) => match ev {
                    Err(_) => return RoundOutcome::Failed(self.failure_notice(&ModelError::Timeout(
                        self.config.llm.timeout_seconds))),
                    Ok(None) => break,
                    Ok(Some(Err(e))) => return RoundOutcome::Failed(self.failure_notice(&e)),
                    Ok(Some(Ok(ev))) => ev,
                },
            };

            match event {
                StreamEvent::TextDelta(delta) if !delta.is_empty() => {
                    text.push_str(&delta);
                    let _ = tx.send(SessionEvent::chunk(delta)).await;
                }
                StreamEvent::ToolCall {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    let p = pending.entry(index).or_default();
                    if !id.is_empty() {
                        p.id = id;
                    }
                    if !name.is_empty() {
                        p.name = name;
                    }
                    p.args_buf.push_str(&arguments);
                }
                StreamEvent::Done => break,
                StreamEvent::Error(e) => {
                    warn!(room_id = %self.room_id, turn = self.turn_no, "model stream error: {e}");
                }
                _ => {}
            }
        }

        RoundOutcome::Completed {
            text,
            tool_calls: flush_pending(pending, self.room_id),
        }
    }

    async fn chat_round(
        &mut self,
        messages: &[Message],
        tools: &[wyrd_model::ToolSchema],
        tx: &mpsc::Sender<SessionEvent>,
        cancel: &mut oneshot::Receiver<()>,
        deadline: Instant,
    ) -> RoundOutcome {
        let req = ChatRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: ToolChoice::Auto,
            ..Default::default()
        };

        let resp = tokio::select! {
            biased;
            _ = &mut *cancel => return RoundOutcome::Cancelled,
            res = timeout_at(deadline, self.model.chat(req)) => match res {
                Err(_) => return RoundOutcome::Failed(self.failure_notice(&ModelError::Timeout(
                    self.config.llm.timeout_seconds))),
                Ok(Err(e)) => return RoundOutcome::Failed(self.failure_notice(&e)),
                Ok(Ok(r)) => r,
            },
        };

        if !resp.content.is_empty() {
            let _ = tx.send(SessionEvent::chunk(resp.content.clone())).await;
        }
        RoundOutcome::Completed {
            text: resp.content,
            tool_calls: resp.tool_calls,
        }
    }

    /// Translate buffered tool side effects into session events and staging.
    async fn drain_effects(&mut self, tx: &mpsc::Sender<SessionEvent>, report: &mut TurnReport) {
        while let Ok(effect) = self.effects_rx.try_recv() {
            match effect {
                ToolEffect::DiceRoll(r) => {
                    let _ = tx.send(SessionEvent::DiceRoll { report: r }).await;
                }
                ToolEffect::RestrictGate {
                    allowed_character_ids,
                    reason,
                } => {
                    let _ = tx
                        .send(SessionEvent::ActionRestriction {
                            allowed_character_ids: allowed_character_ids.clone(),
                            reason: reason.clone(),
                        })
                        .await;
                    report.staged_gate = Some(TurnGate::Restricted {
                        allowed_character_ids,
                        reason,
                    });
                }
                ToolEffect::StartCombat { encounter_brief } => {
                    let _ = tx
                        .send(SessionEvent::StateTransition {
                            from: self.kind,
                            to: StateKind::Combat,
                        })
                        .await;
                    report.staged_transition = Some(StateKind::Combat);
                    report.encounter_brief = Some(encounter_brief);
                }
            }
        }
    }

    fn failure_notice(&self, err: &ModelError) -> String {
        warn!(room_id = %self.room_id, turn = self.turn_no, "model call failed: {err}");
        match err {
            ModelError::Timeout(_) => TIMEOUT_NOTICE.to_string(),
            other => format!("(LLM error: {other})"),
        }
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

/// Flush accumulated streamed tool calls, ordered by index.
///
/// A call with an empty name cannot be dispatched and is dropped; an empty
/// id gets a synthetic fallback so the result message can still reference
/// it.  Argument validation happens at execution time.
fn flush_pending(pending: HashMap<u32, PendingToolCall>, room_id: &str) -> Vec<ToolCallRequest> {
    let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    sorted.sort_by_key(|(idx, _)| *idx);

    let mut out = Vec::with_capacity(sorted.len());
    for (i, (_, p)) in sorted.into_iter().enumerate() {
        if p.name.is_empty() {
            warn!(room_id, "dropping streamed tool call with empty name");
            continue;
        }
        let id = if p.id.is_empty() {
            format!("tc_synthetic_{i}")
        } else {
            p.id
        };
        let arguments = if p.args_buf.is_empty() {
            "{}".to_string()
        } else {
            p.args_buf
        };
        out.push(ToolCallRequest {
            id,
            name: p.name,
            arguments,
        });
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str, name: &str, args: &str) -> PendingToolCall {
        PendingToolCall {
            id: id.into(),
            name: name.into(),
            args_buf: args.into(),
        }
    }

    #[test]
    fn flush_orders_by_index() {
        let mut map = HashMap::new();
        map.insert(2, pending("b", "second", "{}"));
        map.insert(0, pending("a", "first", "{}"));
        let calls = flush_pending(map, "room");
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn flush_drops_nameless_calls() {
        let mut map = HashMap::new();
        map.insert(0, pending("a", "", "{}"));
        map.insert(1, pending("b", "real", "{}"));
        let calls = flush_pending(map, "room");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "real");
    }

    #[test]
    fn flush_synthesizes_missing_ids_and_args() {
        let mut map = HashMap::new();
        map.insert(0, pending("", "tool", ""));
        let calls = flush_pending(map, "room");
        assert!(calls[0].id.starts_with("tc_synthetic_"));
        assert_eq!(calls[0].arguments, "{}");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-turn event distribution.
//!
//! The turn loop writes one ordered event stream; three consumers hang off
//! it: the client stream, the history writer, and (post-turn) the world
//! context extractor.  The history writer runs inline here — it only
//! accumulates strings.  Client delivery goes through a bounded per-client
//! buffer drained by a forwarder task: when the client falls behind, the
//! oldest narrative chunks are dropped first and adjacent survivors are
//! coalesced on delivery, while dice, restriction, transition, and turn-end
//! events are never dropped.  Either way the turn itself never blocks on
//! the client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::events::SessionEvent;

/// Upper bound on events buffered for one client.
const CLIENT_BUFFER_CAP: usize = 32;

/// Bounded per-client event buffer with drop-oldest overflow.
#[derive(Default)]
struct ClientBuffer {
    queue: VecDeque<SessionEvent>,
    closed: bool,
    dropped: usize,
}

impl ClientBuffer {
    /// Enqueue one event.  At capacity, the oldest narrative chunk in the
    /// queue is dropped to make room.  Critical events are enqueued
    /// regardless: their count per turn is bounded by the round cap, so the
    /// overshoot is bounded too.
    fn push(&mut self, ev: SessionEvent) {
        if self.queue.len() >= CLIENT_BUFFER_CAP {
            if let Some(idx) = self.queue.iter().position(|e| e.is_coalescable()) {
                let _ = self.queue.remove(idx);
                self.dropped += 1;
            } else if ev.is_coalescable() {
                // Only critical events are queued; shed the newcomer instead.
                self.dropped += 1;
                return;
            }
        }
        self.queue.push_back(ev);
    }

    /// Dequeue the next event, merging consecutive narrative chunks into
    /// one delivery.
    fn pop_coalesced(&mut self) -> Option<SessionEvent> {
        let ev = self.queue.pop_front()?;
        if let SessionEvent::NarrativeChunk { mut content } = ev {
            while matches!(self.queue.front(), Some(SessionEvent::NarrativeChunk { .. })) {
                if let Some(SessionEvent::NarrativeChunk { content: more }) =
                    self.queue.pop_front()
                {
                    content.push_str(&more);
                }
            }
            return Some(SessionEvent::NarrativeChunk { content });
        }
        Some(ev)
    }
}

/// Consume a turn's raw event stream.
///
/// Buffers every event for the client forwarder and assembles the
/// assistant response from the narrative chunks.  Returns the assembled
/// text once `TurnEnd` is seen (or the stream closes early on a crash).
pub async fn distribute(
    mut raw_rx: mpsc::Receiver<SessionEvent>,
    client_tx: mpsc::Sender<SessionEvent>,
) -> String {
    let buffer = Arc::new(Mutex::new(ClientBuffer::default()));
    let notify = Arc::new(Notify::new());
    // Detached on purpose: the forwarder drains the buffer at the client's
    // pace after the turn has already finished.
    tokio::spawn(forward_to_client(buffer.clone(), notify.clone(), client_tx));

    let mut assembled = String::new();
    while let Some(ev) = raw_rx.recv().await {
        if let SessionEvent::NarrativeChunk { content } = &ev {
            assembled.push_str(content);
        }
        let done = matches!(ev, SessionEvent::TurnEnd);
        buffer.lock().expect("client buffer poisoned").push(ev);
        notify.notify_one();
        if done {
            break;
        }
    }
    {
        let mut b = buffer.lock().expect("client buffer poisoned");
        b.closed = true;
        if b.dropped > 0 {
            debug!(dropped = b.dropped, "slow client: narrative chunks dropped");
        }
    }
    notify.notify_one();
    assembled
}

/// Drain the bounded buffer into the client channel.
async fn forward_to_client(
    buffer: Arc<Mutex<ClientBuffer>>,
    notify: Arc<Notify>,
    client: mpsc::Sender<SessionEvent>,
) {
    loop {
        let (ev, closed) = {
            let mut b = buffer.lock().expect("client buffer poisoned");
            (b.pop_coalesced(), b.closed)
        };
        match ev {
            Some(ev) => {
                if client.send(ev).await.is_err() {
                    debug!("client stream dropped; stopping forwarder");
                    return;
                }
            }
            None if closed => return,
            // A `notify_one` between our pop and this await leaves a stored
            // permit, so no wake-up is lost.
            None => notify.notified().await,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

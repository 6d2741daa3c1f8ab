// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use wyrd_state::{PlayerAction, TurnGate};

/// Per-room buffer of pending player actions.
///
/// Holds at most one action per `user_id`: a resubmission before the drain
/// overwrites the earlier action in place, keeping the original buffer
/// position.  Mutations are serialized by a mutex with short critical
/// sections; `drain` is atomic with the clear.
#[derive(Debug, Default)]
pub struct ActionManager {
    pending: Mutex<Vec<PlayerAction>>,
}

impl ActionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an action, replacing any earlier action from the same user.
    pub fn add(&self, action: PlayerAction) {
        let mut pending = self.pending.lock().expect("action buffer poisoned");
        match pending.iter_mut().find(|a| a.user_id == action.user_id) {
            Some(existing) => *existing = action,
            None => pending.push(action),
        }
    }

    /// A copy of the buffer in submission order.
    pub fn snapshot(&self) -> Vec<PlayerAction> {
        self.pending.lock().expect("action buffer poisoned").clone()
    }

    /// Atomically take and clear the buffer.  Idempotent: a second drain
    /// after a turn ends yields an empty list.
    pub fn drain(&self) -> Vec<PlayerAction> {
        std::mem::take(&mut *self.pending.lock().expect("action buffer poisoned"))
    }

    /// Whether the buffered actions satisfy the gate for `member_count`
    /// members.
    pub fn has_all_acted(&self, member_count: usize, gate: &TurnGate) -> bool {
        let pending = self.pending.lock().expect("action buffer poisoned");
        gate.can_advance(&pending, member_count)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("action buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

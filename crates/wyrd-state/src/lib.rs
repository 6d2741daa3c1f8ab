// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod action;
mod character;
mod gate;
mod state;
mod turn;

pub use action::PlayerAction;
pub use character::{ActiveCondition, CharacterState};
pub use gate::TurnGate;
pub use state::{GameState, RoomPhase, StateKind, WorldContext};
pub use turn::{ConversationTurn, GameSnapshot, TurnMetadata};

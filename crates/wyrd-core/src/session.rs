// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The per-room game session: owns the state, the turn gate, and the event
//! pipeline, and guarantees at most one running turn per room.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tracing::{debug, warn};

use wyrd_config::Config;
use wyrd_model::ModelProvider;
use wyrd_state::{
    ConversationTurn, GameSnapshot, GameState, PlayerAction, RoomPhase, StateKind, TurnGate,
};
use wyrd_store::GameStore;
use wyrd_tools::{exploration_registry, SharedGameState, SharedRng, ToolEffect, ToolRegistry};

use crate::actions::ActionManager;
use crate::context::{ContextBuilder, TurnInput};
use crate::events::SessionEvent;
use crate::exploration::ExplorationTurn;
use crate::extractor::{apply_items, WorldContextExtractor};
use crate::fanout;
use crate::history::ConversationLog;
use crate::prompts::PromptSet;

/// Result of submitting a player action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The current gate refuses this action; the buffer is unchanged.
    Refused { reason: String },
    /// Buffered; the gate is still waiting for more actions.
    Buffered,
    /// Buffered, and the gate would now admit the turn.
    ReadyToAdvance,
}

#[derive(Debug, Clone)]
struct Member {
    username: String,
    character_id: Option<String>,
}

struct SessionInner {
    phase: RoomPhase,
    gate: TurnGate,
    kind: StateKind,
    history: ConversationLog,
    members: BTreeMap<String, Member>,
    turn_counter: u64,
}

/// One room's turn engine.
///
/// `process_actions` runs turns strictly one at a time: a second concurrent
/// call queues on the fair turn mutex, so turn N's final event
/// happens-before turn N+1's first.  The game state is mutated only on the
/// turn-executing task (and, post-turn, by the extractor under the state
/// lock); readers clone snapshots.
pub struct GameSession {
    room_id: String,
    config: Arc<Config>,
    model: Arc<dyn ModelProvider>,
    state: SharedGameState,
    tools: Arc<ToolRegistry>,
    /// Receiving end of the tool effect channel; taken by the turn executor.
    effects_rx: TokioMutex<mpsc::Receiver<ToolEffect>>,
    prompts: Arc<PromptSet>,
    builder: ContextBuilder,
    store: Option<Arc<dyn GameStore>>,
    actions: ActionManager,
    inner: StdMutex<SessionInner>,
    /// Fair mutex guaranteeing at most one `process_actions` per room.
    turn_lock: TokioMutex<()>,
    extractor: StdMutex<Option<WorldContextExtractor>>,
}

impl GameSession {
    /// Wire up a session for one room.
    ///
    /// `seed` fixes the dice RNG for deterministic replays and tests;
    /// `None` seeds from entropy.  `store: None` keeps the room ephemeral.
    pub fn new(
        room_id: impl Into<String>,
        model: Arc<dyn ModelProvider>,
        config: Arc<Config>,
        store: Option<Arc<dyn GameStore>>,
        seed: Option<u64>,
    ) -> Arc<Self> {
        let room_id = room_id.into();
        let state: SharedGameState =
            Arc::new(TokioMutex::new(GameState::new(room_id.clone())));
        let rng: SharedRng = Arc::new(StdMutex::new(match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        }));
        let (effects_tx, effects_rx) = mpsc::channel::<ToolEffect>(64);
        let tools = Arc::new(exploration_registry(state.clone(), rng.clone(), effects_tx));
        let prompts = Arc::new(PromptSet::load(config.resolved_prompt_dir().as_deref()));
        let extractor = StdMutex::new(Some(WorldContextExtractor::new(
            model.clone(),
            prompts.clone(),
            config.llm.timeout_seconds,
        )));

        Arc::new(Self {
            room_id,
            config,
            model,
            state,
            tools,
            effects_rx: TokioMutex::new(effects_rx),
            prompts,
            builder: ContextBuilder::standard(Vec::new(), None),
            store,
            actions: ActionManager::new(),
            inner: StdMutex::new(SessionInner {
                phase: RoomPhase::Open,
                gate: TurnGate::AllPlayers,
                kind: StateKind::Exploration,
                history: ConversationLog::new(),
                members: BTreeMap::new(),
                turn_counter: 0,
            }),
            turn_lock: TokioMutex::new(()),
            extractor,
        })
    }

    /// Disable the post-turn extraction call (tests, minimal rooms).
    pub fn disable_extraction(&self) {
        *self.extractor.lock().unwrap() = None;
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn phase(&self) -> RoomPhase {
        self.inner.lock().unwrap().phase
    }

    /// Move along the room lifecycle; illegal edges are errors.
    pub fn advance_phase(&self, to: RoomPhase) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.phase.can_transition(to) {
            anyhow::bail!("illegal room transition {:?} -> {:?}", inner.phase, to);
        }
        debug!(room_id = %self.room_id, from = ?inner.phase, to = ?to, "room phase change");
        inner.phase = to;
        Ok(())
    }

    /// Convenience: walk Open → Ready → InGame.
    pub fn start(&self) -> anyhow::Result<()> {
        if self.phase() == RoomPhase::Open {
            self.advance_phase(RoomPhase::Ready)?;
        }
        self.advance_phase(RoomPhase::InGame)
    }

    // ── Membership ────────────────────────────────────────────────────────────

    /// Register a member; referencing a character creates its state lazily so
    /// `character_states` always covers the active membership.
    pub async fn add_member(
        &self,
        user_id: impl Into<String>,
        username: impl Into<String>,
        character: Option<(String, String)>,
    ) {
        let user_id = user_id.into();
        let username = username.into();
        if let Some((character_id, character_name)) = &character {
            let mut state = self.state.lock().await;
            let c = state.character_mut(character_id);
            if c.character_name.is_none() {
                c.character_name = Some(character_name.clone());
            }
        }
        self.inner.lock().unwrap().members.insert(
            user_id,
            Member {
                username,
                character_id: character.map(|(id, _)| id),
            },
        );
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().unwrap().members.len()
    }

    /// `(user_id, username)` pairs of everyone at the table.
    pub fn roster(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .unwrap()
            .members
            .iter()
            .map(|(id, m)| (id.clone(), m.username.clone()))
            .collect()
    }

    /// Character ids of the current membership (for gate construction).
    pub fn member_character_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .members
            .values()
            .filter_map(|m| m.character_id.clone())
            .collect()
    }

    // ── Gate and state variant ────────────────────────────────────────────────

    pub fn turn_gate(&self) -> TurnGate {
        self.inner.lock().unwrap().gate.clone()
    }

    pub fn set_turn_gate(&self, gate: TurnGate) {
        self.inner.lock().unwrap().gate = gate;
    }

    pub fn state_kind(&self) -> StateKind {
        self.inner.lock().unwrap().kind
    }

    /// Switch the state variant.  Only meaningful between turns; mid-turn
    /// tool-triggered transitions are staged and applied at turn end.
    pub fn transition_to(&self, kind: StateKind) {
        let mut inner = self.inner.lock().unwrap();
        debug!(room_id = %self.room_id, from = %inner.kind, to = %kind, "state transition");
        inner.kind = kind;
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    /// Gate-check and buffer an action (last write per user wins).
    pub async fn submit_action(&self, action: PlayerAction) -> SubmitOutcome {
        let gate = self.turn_gate();
        if self.phase() != RoomPhase::InGame || !gate.can_act(&action) {
            return SubmitOutcome::Refused {
                reason: gate.description(),
            };
        }
        if let (Some(id), name) = (&action.character_id, &action.character_name) {
            let mut state = self.state.lock().await;
            let c = state.character_mut(id);
            if c.character_name.is_none() {
                c.character_name = name.clone();
            }
        }
        self.actions.add(action);
        if self.actions.has_all_acted(self.member_count(), &gate) {
            SubmitOutcome::ReadyToAdvance
        } else {
            SubmitOutcome::Buffered
        }
    }

    pub fn pending_actions(&self) -> Vec<PlayerAction> {
        self.actions.snapshot()
    }

    // ── Turns ─────────────────────────────────────────────────────────────────

    /// Drain the buffer and run a turn with whatever was collected — the
    /// manual-advance path.  An empty buffer still runs one model round.
    pub fn force_advance(
        self: &Arc<Self>,
        cancel: oneshot::Receiver<()>,
    ) -> mpsc::Receiver<SessionEvent> {
        let drained = self.actions.drain();
        self.process_actions(drained, cancel)
    }

    /// Run one turn over `actions`, returning the client event stream.
    ///
    /// The turn executes on a background task; concurrent calls queue FIFO
    /// on the turn mutex.  Dropping the `cancel` sender (or firing it)
    /// aborts generation at the next event boundary.
    pub fn process_actions(
        self: &Arc<Self>,
        actions: Vec<PlayerAction>,
        cancel: oneshot::Receiver<()>,
    ) -> mpsc::Receiver<SessionEvent> {
        let (client_tx, client_rx) = mpsc::channel(32);
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.execute_turn(actions, client_tx, cancel).await;
        });
        client_rx
    }

    async fn execute_turn(
        self: Arc<Self>,
        actions: Vec<PlayerAction>,
        client_tx: mpsc::Sender<SessionEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        let turn_permit = self.turn_lock.lock().await;

        let (kind, turn_no, recent_turns) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase != RoomPhase::InGame {
                warn!(room_id = %self.room_id, phase = ?inner.phase,
                    "turn refused: room is not in game");
                return;
            }
            inner.turn_counter += 1;
            (
                inner.kind,
                inner.turn_counter,
                inner
                    .history
                    .recent(self.config.engine.history_recent_turns)
                    .to_vec(),
            )
        };

        let (raw_tx, raw_rx) = mpsc::channel::<SessionEvent>(64);
        let fan = tokio::spawn(fanout::distribute(raw_rx, client_tx));

        let snapshot = self.state.lock().await.clone();
        let messages = {
            let input = TurnInput {
                state: &snapshot,
                pending: &actions,
                history: &recent_turns,
                prompts: &self.prompts,
            };
            self.builder.build(&input)
        };

        let report = match messages {
            Err(e) => {
                // A broken context aborts the turn: one diagnostic chunk,
                // turn end, no history append.
                warn!(room_id = %self.room_id, turn = turn_no, "context build failed: {e}");
                let _ = raw_tx.send(SessionEvent::chunk(format!("(context error: {e})"))).await;
                let _ = raw_tx.send(SessionEvent::TurnEnd).await;
                drop(raw_tx);
                let _ = fan.await;
                return;
            }
            Ok(messages) => {
                let mut effects_rx = self.effects_rx.lock().await;
                let turn = ExplorationTurn {
                    model: &self.model,
                    tools: &self.tools,
                    effects_rx: &mut effects_rx,
                    config: &self.config,
                    room_id: &self.room_id,
                    turn_no,
                    kind,
                };
                let report = turn.run(messages, &raw_tx, &mut cancel).await;
                drop(raw_tx);
                report
            }
        };

        let assembled = fan.await.unwrap_or_default();

        // Stage gate replacement and state transition before the turn lock
        // is released so the next queued turn observes them.
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(gate) = report.staged_gate.clone() {
                debug!(room_id = %self.room_id, turn = turn_no,
                    gate = %gate.description(), "installing staged turn gate");
                inner.gate = gate;
            }
            if let Some(next_kind) = report.staged_transition {
                inner.kind = next_kind;
            }
        }
        if let Some(brief) = report.encounter_brief.clone() {
            let mut state = self.state.lock().await;
            state.active_encounters.push(brief);
            state.touch();
        }

        // A cancelled turn with no narrative leaves no trace in history;
        // cancelled-with-partial commits the partial text.
        let append_history = !(report.cancelled && assembled.is_empty());
        let turn_record = ConversationTurn::new(actions, assembled.clone(), kind.to_string());
        let history_len = if append_history {
            let mut inner = self.inner.lock().unwrap();
            inner.history.append(turn_record.clone());
            let len = inner.history.len();
            drop(inner);
            if let Some(store) = &self.store {
                let store = Arc::clone(store);
                let room_id = self.room_id.clone();
                let record = turn_record.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.append_turn(&room_id, record).await {
                        warn!(room_id = %room_id, turn = turn_no, "history persist failed: {e}");
                    }
                });
            }
            len
        } else {
            self.inner.lock().unwrap().history.len()
        };

        drop(turn_permit);

        // Post-turn consumers run off the turn lock: the next turn may start
        // while extraction and autosave are still in flight.
        if !report.cancelled && !report.failed {
            self.run_extraction(&turn_record, &assembled, turn_no).await;
        }
        self.autosave(history_len, turn_no).await;
    }

    async fn run_extraction(&self, turn: &ConversationTurn, assistant_text: &str, turn_no: u64) {
        let extractor = self.extractor.lock().unwrap().clone();
        let Some(extractor) = extractor else {
            return;
        };
        match extractor.extract(&turn.user_inputs, assistant_text).await {
            Ok(items) if !items.is_empty() => {
                let mut state = self.state.lock().await;
                apply_items(
                    &mut state.world_context,
                    items,
                    self.config.engine.world_recent_events_cap,
                    self.config.engine.world_facts_cap,
                );
                state.touch();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(room_id = %self.room_id, turn = turn_no, "world context extraction failed: {e}");
            }
        }
    }

    async fn autosave(&self, history_len: usize, turn_no: u64) {
        let Some(store) = &self.store else {
            return;
        };
        let state = self.state.lock().await.clone();
        let snapshot = GameSnapshot::of(&state, history_len);
        let store = Arc::clone(store);
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .save_snapshot(&room_id, "autosave", snapshot, None)
                .await
            {
                warn!(room_id = %room_id, turn = turn_no, "autosave failed: {e}");
            }
            if let Err(e) = store
                .upsert_world_context(&room_id, state.world_context.clone())
                .await
            {
                warn!(room_id = %room_id, turn = turn_no, "world context persist failed: {e}");
            }
        });
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Set the adventure module shown to the dungeon master.
    pub async fn set_module(&self, module: Option<String>) {
        let mut state = self.state.lock().await;
        state.module_name = module;
        state.touch();
    }

    /// Cheap copy-on-read snapshot for status views and tests.
    pub async fn state_snapshot(&self) -> GameState {
        self.state.lock().await.clone()
    }

    /// Restore a snapshot into the live state.  Call between turns.
    pub async fn restore_snapshot(&self, snapshot: GameSnapshot) {
        *self.state.lock().await = snapshot.state;
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    pub fn last_turn(&self) -> Option<ConversationTurn> {
        self.inner.lock().unwrap().history.all().last().cloned()
    }

    pub fn recent_history(&self, n: usize) -> Vec<ConversationTurn> {
        self.inner.lock().unwrap().history.recent(n).to_vec()
    }
}

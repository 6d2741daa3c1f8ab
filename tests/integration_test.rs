// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Whole-stack integration tests: config → session → turn → file store.
use std::sync::Arc;
use std::time::Duration;

use wyrd_config::Config;
use wyrd_core::{GameSession, SessionEvent, World};
use wyrd_model::{ScriptedModelProvider, ScriptedReply};
use wyrd_state::PlayerAction;
use wyrd_store::{GameStore, JsonFileStore};

fn config() -> Arc<Config> {
    let mut cfg = Config::default();
    cfg.llm.provider = "mock".into();
    Arc::new(cfg)
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        let done = matches!(ev, SessionEvent::TurnEnd);
        events.push(ev);
        if done {
            break;
        }
    }
    events
}

#[tokio::test]
async fn played_turn_round_trips_through_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn GameStore> = Arc::new(JsonFileStore::new(dir.path()));

    let model = Arc::new(ScriptedModelProvider::new(vec![
        ScriptedReply::stream(["You make camp ", "beneath the old oak."]),
    ]));
    let world = World::new();
    let session = world.create_room("table", model, config(), Some(store.clone()), Some(9));
    session.disable_extraction();
    session
        .add_member("local", "player", Some(("ranger".into(), "Ash".into())))
        .await;
    session.start().unwrap();

    let (_cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
    let action = PlayerAction::new("local", "player", "I make camp").with_character("ranger", "Ash");
    let events = drain(session.process_actions(vec![action], cancel_rx)).await;
    assert!(matches!(events.last(), Some(SessionEvent::TurnEnd)));

    // Let the fire-and-forget persistence land.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The turn and the autosave both reached disk.
    let turns = store.list_turns("table", None).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(
        turns[0].assistant_response,
        "You make camp beneath the old oak."
    );

    let snapshot = store
        .load_snapshot("table", "autosave")
        .await
        .unwrap()
        .expect("autosave snapshot written");
    assert_eq!(snapshot.state, session.state_snapshot().await);
    assert!(snapshot.state.character_states.contains_key("ranger"));

    // A fresh session restores the exact same state from the snapshot.
    let revived = GameSession::new(
        "table",
        Arc::new(ScriptedModelProvider::echo()),
        config(),
        Some(store),
        None,
    );
    revived.restore_snapshot(snapshot.clone()).await;
    assert_eq!(revived.state_snapshot().await, snapshot.state);
}

#[tokio::test]
async fn two_rooms_run_turns_independently() {
    let world = World::new();
    let mk = |reply: &str| {
        Arc::new(ScriptedModelProvider::always_text(reply.to_string()))
            as Arc<dyn wyrd_model::ModelProvider>
    };
    let a = world.create_room("room-a", mk("In room A."), config(), None, Some(1));
    let b = world.create_room("room-b", mk("In room B."), config(), None, Some(2));
    for s in [&a, &b] {
        s.disable_extraction();
        s.add_member("u", "u", None).await;
        s.start().unwrap();
    }

    let (_ta, ca) = tokio::sync::oneshot::channel();
    let (_tb, cb) = tokio::sync::oneshot::channel();
    let rx_a = a.process_actions(vec![PlayerAction::new("u", "u", "hello")], ca);
    let rx_b = b.process_actions(vec![PlayerAction::new("u", "u", "hello")], cb);

    let (events_a, events_b) = tokio::join!(drain(rx_a), drain(rx_b));
    assert!(events_a
        .iter()
        .any(|e| matches!(e, SessionEvent::NarrativeChunk { content } if content.contains("room A"))));
    assert!(events_b
        .iter()
        .any(|e| matches!(e, SessionEvent::NarrativeChunk { content } if content.contains("room B"))));
    assert_eq!(a.history_len(), 1);
    assert_eq!(b.history_len(), 1);
}

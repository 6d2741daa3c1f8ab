// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use wyrd_core::{SessionEvent, SubmitOutcome, World};
use wyrd_state::PlayerAction;
use wyrd_store::{GameStore, JsonFileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(wyrd_config::load(cli.config.as_deref())?);

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&*config).unwrap_or_default());
            Ok(())
        }
        Commands::Saves { room } => {
            let store = JsonFileStore::new(config.resolved_data_dir());
            let saves = store.list_snapshots(&room).await?;
            if saves.is_empty() {
                println!("no snapshots for room '{room}'");
            }
            for s in saves {
                let desc = s.description.unwrap_or_default();
                println!(
                    "{:20} turns:{:<4} saved_at_ms:{} {desc}",
                    s.slot_name, s.history_len, s.saved_at_ms
                );
            }
            Ok(())
        }
        Commands::Play {
            room,
            character,
            name,
            seed,
            module,
        } => play(config, room, character, name, seed, module).await,
    }
}

async fn play(
    config: Arc<wyrd_config::Config>,
    room: String,
    character: String,
    name: String,
    seed: Option<u64>,
    module: Option<String>,
) -> anyhow::Result<()> {
    let model = wyrd_model::from_config(&config.llm).context("building model driver")?;
    let store: Arc<dyn GameStore> = Arc::new(JsonFileStore::new(config.resolved_data_dir()));
    let world = World::new();

    let session = world.create_room(room.clone(), model, config, Some(store), seed);
    session
        .add_member("local", "player", Some((character.clone(), name.clone())))
        .await;
    session.set_module(module).await;
    session.start()?;

    let table: Vec<String> = session
        .roster()
        .into_iter()
        .map(|(_, username)| username)
        .collect();
    println!(
        "wyrd — room '{room}', at the table: {}. Playing {name}; empty line quits.",
        table.join(", ")
    );
    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line == "quit" {
            break;
        }

        let action = PlayerAction::new("local", "player", line)
            .with_character(character.clone(), name.clone());
        if let SubmitOutcome::Refused { reason } = session.submit_action(action).await {
            println!("(action refused: {reason})");
            continue;
        }

        // Single-player table: every submission advances the turn.  The
        // cancel sender must outlive the turn (dropping it aborts).
        let (_cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
        let mut events = session.force_advance(cancel_rx);
        while let Some(ev) = events.recv().await {
            render_event(ev);
        }
    }
    println!("\nfarewell.");
    Ok(())
}

fn render_event(ev: SessionEvent) {
    match ev {
        SessionEvent::NarrativeChunk { content } => {
            print!("{content}");
            std::io::stdout().flush().ok();
        }
        SessionEvent::DiceRoll { report } => {
            let ability = report
                .ability
                .map(|a| a.to_string())
                .unwrap_or_else(|| "—".into());
            let dc = report.dc.map(|d| d.to_string()).unwrap_or_else(|| "?".into());
            let verdict = if report.success { "success" } else { "failure" };
            println!(
                "\n[dice] {} {ability} vs DC {dc}: {} ({verdict}) — {}",
                report.character_name, report.roll.total, report.reason
            );
        }
        SessionEvent::ActionRestriction { reason, .. } => {
            println!("\n[table] action restricted: {reason}");
        }
        SessionEvent::StateTransition { from, to } => {
            println!("\n[table] {from} -> {to}");
        }
        SessionEvent::TurnEnd => println!(),
    }
}

/// Route tracing to WYRD_LOG_FILE when set, else stderr.  Without `-v` the
/// default filter is warnings-only so the interactive table stays clean;
/// WYRD_LOG overrides everything.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("WYRD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "warn" })
    });

    if let Ok(path) = std::env::var("WYRD_LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
                .init();
            return;
        }
    }
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

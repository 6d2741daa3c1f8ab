// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "wyrd",
    about = "A cooperative tabletop-RPG server with an LLM dungeon master",
    version
)]
pub struct Cli {
    /// Path to an explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr (or WYRD_LOG_FILE) at debug level.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a single-player room on stdin.
    ///
    /// Each line you type is submitted as your character's action and the
    /// turn advances immediately. Empty line or Ctrl-D quits.
    Play {
        /// Room identifier (also the save-file key).
        #[arg(long, default_value = "table")]
        room: String,
        /// Your character's id.
        #[arg(long, default_value = "adventurer")]
        character: String,
        /// Your character's display name.
        #[arg(long, default_value = "The Adventurer")]
        name: String,
        /// Fix the dice RNG seed for reproducible sessions.
        #[arg(long)]
        seed: Option<u64>,
        /// Adventure module name shown to the dungeon master.
        #[arg(long)]
        module: Option<String>,
    },

    /// Print the resolved configuration and exit.
    ShowConfig,

    /// List the snapshot slots saved for a room.
    Saves {
        #[arg(long, default_value = "table")]
        room: String,
    },
}

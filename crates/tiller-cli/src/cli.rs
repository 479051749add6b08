// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Session management for the tiller agent control plane.
#[derive(Parser, Debug)]
#[command(name = "tiller", version, about)]
pub struct Cli {
    /// Base directory for durable sessions (defaults to the
    /// TILLER_SESSIONS_DIR environment variable, then ~/.tiller/sessions).
    #[arg(long, global = true)]
    pub sessions_dir: Option<PathBuf>,

    /// Emit tracing output to stderr (RUST_LOG controls the filter).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and manage durable sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// List the checkpoints recorded for a session.
    Checkpoints {
        /// Session id.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List sessions, most recently accessed first.
    List {
        /// Show only the N most recently created sessions.
        #[arg(long)]
        recent: Option<usize>,
    },

    /// Show one session's metadata and message log.
    Show {
        /// Session id.
        id: String,
        /// Print raw message JSON instead of the text transcript.
        #[arg(long)]
        json: bool,
    },

    /// Fork a session into a new, independent one.
    Fork {
        /// Source session id.
        id: String,
    },

    /// Delete a session.
    Delete {
        /// Session id.
        id: String,
    },

    /// Delete all but the newest sessions.
    Clean {
        /// How many sessions to keep.
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
}

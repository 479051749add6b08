// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod output;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, SessionCommands};
use output::TerminalOutput;
use tiller_core::Output;
use tiller_session::{CheckpointRecorder, Session, SessionStore};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let base_dir = cli
        .sessions_dir
        .clone()
        .unwrap_or_else(tiller_config::env::sessions_dir);
    let store = SessionStore::new(base_dir);
    let out = TerminalOutput;

    if let Err(e) = run(&cli, &store, &out) {
        out.error(&format!("{e:#}"));
        std::process::exit(2);
    }
}

fn init_logging(verbose: bool) {
    if !verbose {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli, store: &SessionStore, out: &TerminalOutput) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Sessions { command } => run_sessions(command, store, out),
        Commands::Checkpoints { id } => {
            let recorder = CheckpointRecorder::open(&store.session_dir(id));
            let checkpoints = recorder.list();
            if checkpoints.is_empty() {
                out.info("no checkpoints");
                return Ok(());
            }
            for cp in checkpoints {
                out.info(&format!(
                    "{}  {}  {}",
                    cp.created_at.format("%Y-%m-%d %H:%M:%S"),
                    cp.id,
                    cp.description
                ));
            }
            Ok(())
        }
    }
}

fn run_sessions(
    command: &SessionCommands,
    store: &SessionStore,
    out: &TerminalOutput,
) -> anyhow::Result<()> {
    match command {
        SessionCommands::List { recent } => {
            let sessions = match recent {
                Some(limit) => store.list_recent_sessions(*limit)?,
                None => store.list_sessions()?,
            };
            if sessions.is_empty() {
                out.info("no sessions");
                return Ok(());
            }
            for session in sessions {
                print_summary(&session, out);
            }
            Ok(())
        }
        SessionCommands::Show { id, json } => {
            let session = store
                .load_session(id)?
                .ok_or_else(|| anyhow::anyhow!("session '{id}' not found"))?;
            print_summary(&session, out);
            if *json {
                out.blank();
                out.info(&serde_json::to_string_pretty(&session.messages)?);
                return Ok(());
            }
            out.section("transcript");
            for message in &session.messages {
                let role = match message.role {
                    tiller_model::Role::User => "user",
                    tiller_model::Role::Assistant => "assistant",
                    tiller_model::Role::System => "system",
                };
                out.info(&format!("[{role}] {}", message.preview(120)));
            }
            Ok(())
        }
        SessionCommands::Fork { id } => {
            let mut fork = store.fork_session(id)?;
            store.save_session(&mut fork)?;
            out.success(&format!("forked {id} -> {}", fork.id));
            Ok(())
        }
        SessionCommands::Delete { id } => {
            store.delete_session(id);
            out.success(&format!("deleted {id}"));
            Ok(())
        }
        SessionCommands::Clean { keep } => {
            let removed = store.clean_old_sessions(*keep)?;
            out.success(&format!("removed {removed} sessions, kept at most {keep}"));
            Ok(())
        }
    }
}

fn print_summary(session: &Session, out: &TerminalOutput) {
    let expired = if session.expired { "  [expired]" } else { "" };
    let preview = session
        .stats
        .as_ref()
        .map(|s| s.last_message_preview.clone())
        .unwrap_or_default();
    out.info(&format!(
        "{}  {}  ({} messages){expired}  {}",
        session.last_accessed_at.format("%Y-%m-%d %H:%M:%S"),
        session.id,
        session.messages.len(),
        preview
    ));
}

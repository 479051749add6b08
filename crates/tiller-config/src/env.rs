// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Environment-variable lookups shared across the workspace.
//!
//! Callers that need a stable value for the life of a component (e.g. the
//! turn engine's default model) should resolve it once at construction
//! rather than re-reading the environment on every turn.

use std::path::PathBuf;
use std::time::Duration;

/// Enables the runtime's per-turn file checkpointing when set to `1`.
/// The name is fixed for compatibility with the runtime SDK.
pub const ENV_FILE_CHECKPOINTING: &str = "CLAUDE_CODE_ENABLE_SDK_FILE_CHECKPOINTING";

/// Overrides the built-in default model.
pub const ENV_DEFAULT_MODEL: &str = "TILLER_MODEL";

/// Overrides the base directory for durable sessions.
pub const ENV_SESSIONS_DIR: &str = "TILLER_SESSIONS_DIR";

/// Overrides the session expiry window, in hours.
pub const ENV_SESSION_EXPIRY_HOURS: &str = "TILLER_SESSION_EXPIRY_HOURS";

/// Model used when neither config nor environment names one.
pub const DEFAULT_MODEL: &str = "sonnet";

/// Sessions older than this that were never re-accessed load as expired.
pub const DEFAULT_SESSION_EXPIRY_HOURS: u64 = 5;

/// Whether the runtime's file-checkpointing feature should be enabled.
pub fn file_checkpointing_enabled() -> bool {
    std::env::var(ENV_FILE_CHECKPOINTING).as_deref() == Ok("1")
}

/// The default model: environment override, else [`DEFAULT_MODEL`].
pub fn default_model() -> String {
    std::env::var(ENV_DEFAULT_MODEL)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Base directory for durable sessions: environment override, else
/// `~/.tiller/sessions`.
pub fn sessions_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_SESSIONS_DIR) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tiller")
        .join("sessions")
}

/// The session expiry window.
pub fn session_expiry() -> Duration {
    let hours = std::env::var(ENV_SESSION_EXPIRY_HOURS)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SESSION_EXPIRY_HOURS);
    Duration::from_secs(hours * 3600)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tiller_model::RuntimeHandle;

use crate::error::SessionError;

/// Default number of checkpoints retained per session.
pub const DEFAULT_KEEP_COUNT: usize = 10;

const METADATA_FILE: &str = "metadata.json";

/// Metadata for one pre-turn snapshot.  The file contents themselves are
/// captured by the runtime's checkpointing feature; only the rewind key and
/// display data live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMeta {
    /// Equals the uuid of the user message that triggered the snapshot.
    pub id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_session_id: Option<String>,
}

/// Derive a checkpoint description from the turn's text: the first 80
/// characters, or a timestamped fallback when the turn has no text.
pub fn checkpoint_description(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("Checkpoint at {}", Utc::now().to_rfc3339())
    } else {
        trimmed.chars().take(80).collect()
    }
}

/// Per-session checkpoint metadata, persisted as an ordered JSON array in
/// `<session dir>/checkpoints/metadata.json`.
pub struct CheckpointRecorder {
    dir: PathBuf,
    keep_count: usize,
    /// In capture order: index 0 is the oldest and first to be evicted.
    entries: Vec<CheckpointMeta>,
}

impl CheckpointRecorder {
    /// Open the recorder for a session directory, loading any existing
    /// metadata.  A corrupt metadata file is reinitialised to empty with a
    /// warning rather than failing the session.
    pub fn open(session_dir: &Path) -> Self {
        let dir = session_dir.join("checkpoints");
        let entries = match std::fs::read_to_string(dir.join(METADATA_FILE)) {
            Ok(text) => match serde_json::from_str::<Vec<CheckpointMeta>>(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "corrupt checkpoint metadata, reinitialising");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            dir,
            keep_count: DEFAULT_KEEP_COUNT,
            entries,
        }
    }

    pub fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count.max(1);
        self
    }

    pub fn keep_count(&self) -> usize {
        self.keep_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a snapshot for the user message `message_id`, evicting the
    /// oldest entries beyond the keep count.
    pub fn capture(
        &mut self,
        message_id: &str,
        description: &str,
        runtime_session_id: Option<&str>,
    ) -> Result<&CheckpointMeta, SessionError> {
        self.entries.push(CheckpointMeta {
            id: message_id.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            runtime_session_id: runtime_session_id.map(str::to_string),
        });
        while self.entries.len() > self.keep_count {
            let evicted = self.entries.remove(0);
            debug!(checkpoint = %evicted.id, "evicted oldest checkpoint");
        }
        self.persist()?;
        Ok(self.entries.last().expect("just pushed"))
    }

    /// Checkpoints newest first.
    pub fn list(&self) -> Vec<CheckpointMeta> {
        let mut out = self.entries.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Rewind files to the state captured for `id` via the runtime handle.
    pub async fn restore(
        &self,
        id: &str,
        handle: &dyn RuntimeHandle,
    ) -> Result<(), SessionError> {
        match handle.rewind_files(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("no checkpoint found") => {
                Err(SessionError::CheckpointNotFound(id.to_string()))
            }
            Err(e) => Err(SessionError::Rewind(e.to_string())),
        }
    }

    fn persist(&self) -> Result<(), SessionError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SessionError::Io(self.dir.display().to_string(), e))?;
        let path = self.dir.join(METADATA_FILE);
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| SessionError::Json(path.display().to_string(), e))?;
        std::fs::write(&path, text).map_err(|e| SessionError::Io(path.display().to_string(), e))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

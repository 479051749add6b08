// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use tiller_config::ResolvedConfig;

use crate::error::SessionError;
use crate::session::{Session, SessionContext, SessionStats};

const METADATA_FILE: &str = "metadata.json";
const MESSAGES_FILE: &str = "messages.json";
const CONTEXT_FILE: &str = "context.json";

/// The durable half of a session: everything except the message log and
/// context, which live in their own files.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMetadata {
    id: String,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    working_directory: PathBuf,
    expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sdk_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<SessionStats>,
}

/// On-disk session store: one `session-<id>` directory per session under
/// the base directory, with `metadata.json`, `messages.json`, and
/// `context.json` inside.
///
/// Only one engine should operate on a given session id at a time;
/// cross-process locking is out of scope.
pub struct SessionStore {
    base_dir: PathBuf,
    expiry: Duration,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            expiry: tiller_config::env::session_expiry(),
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("session-{id}"))
    }

    /// A fresh session id: UTC timestamp plus a random suffix.
    pub fn generate_session_id() -> String {
        let ts = Utc::now().format("%Y%m%d-%H%M%S");
        let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_string();
        format!("{ts}-{suffix}")
    }

    /// Create an in-memory session rooted at `work_dir`.  Not persisted
    /// until the first `save_session`.
    pub fn create_session(
        &self,
        work_dir: impl Into<PathBuf>,
        project_config: ResolvedConfig,
    ) -> Result<Session, SessionError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| SessionError::Io(self.base_dir.display().to_string(), e))?;

        let now = Utc::now();
        let work_dir = work_dir.into();
        Ok(Session {
            id: Self::generate_session_id(),
            created_at: now,
            last_accessed_at: now,
            working_directory: work_dir.clone(),
            expired: false,
            sdk_session_id: None,
            parent_session_id: None,
            stats: None,
            messages: Vec::new(),
            context: SessionContext {
                working_directory: work_dir,
                resolved_config: project_config,
                active_agents: Vec::new(),
            },
        })
    }

    /// Persist the session, recomputing stats from the message log first.
    /// Each file is valid JSON after a successful return; crash atomicity
    /// across the three files is not promised.
    pub fn save_session(&self, session: &mut Session) -> Result<(), SessionError> {
        session.stats = Some(SessionStats::compute(&session.messages));

        let dir = self.session_dir(&session.id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| SessionError::Io(dir.display().to_string(), e))?;

        let metadata = SessionMetadata {
            id: session.id.clone(),
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
            working_directory: session.working_directory.clone(),
            expired: session.expired,
            sdk_session_id: session.sdk_session_id.clone(),
            parent_session_id: session.parent_session_id.clone(),
            stats: session.stats.clone(),
        };
        write_json(&dir.join(METADATA_FILE), &metadata)?;
        write_json(&dir.join(MESSAGES_FILE), &session.messages)?;
        write_json(&dir.join(CONTEXT_FILE), &session.context)?;
        debug!(session = %session.id, messages = session.messages.len(), "session saved");
        Ok(())
    }

    /// Load a session, bumping its in-memory access time (not persisted).
    /// Returns `None` when the session directory does not exist.
    pub fn load_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        self.load_session_inner(id, true)
    }

    fn load_session_inner(&self, id: &str, bump: bool) -> Result<Option<Session>, SessionError> {
        let dir = self.session_dir(id);
        if !dir.is_dir() {
            return Ok(None);
        }

        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            warn!(session = id, "session directory without metadata record");
            return Ok(None);
        }
        let metadata: SessionMetadata = read_json(&metadata_path)?;

        // Message and context records are best effort: a session whose
        // metadata exists but messages do not loads with an empty log.
        let messages = match read_json(&dir.join(MESSAGES_FILE)) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session = id, error = %e, "messages record missing or unreadable");
                Vec::new()
            }
        };
        let context = match read_json(&dir.join(CONTEXT_FILE)) {
            Ok(context) => context,
            Err(e) => {
                warn!(session = id, error = %e, "context record missing or unreadable");
                SessionContext {
                    working_directory: metadata.working_directory.clone(),
                    ..Default::default()
                }
            }
        };

        let now = Utc::now();
        let aged_out = now.signed_duration_since(metadata.created_at)
            >= chrono::Duration::from_std(self.expiry).unwrap_or(chrono::Duration::MAX);
        let expired = metadata.expired || aged_out;

        Ok(Some(Session {
            id: metadata.id,
            created_at: metadata.created_at,
            last_accessed_at: if bump { now } else { metadata.last_accessed_at },
            working_directory: metadata.working_directory,
            expired,
            sdk_session_id: metadata.sdk_session_id,
            parent_session_id: metadata.parent_session_id,
            stats: metadata.stats,
            messages,
            context,
        }))
    }

    /// All sessions, most recently accessed first.
    pub fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        let mut sessions = self.load_all()?;
        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(sessions)
    }

    /// The `limit` newest sessions by creation time.
    pub fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>, SessionError> {
        let mut sessions = self.load_all()?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn load_all(&self) -> Result<Vec<Session>, SessionError> {
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.base_dir)
            .map_err(|e| SessionError::Io(self.base_dir.display().to_string(), e))?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name.strip_prefix("session-") else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            match self.load_session_inner(id, false) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => warn!(session = id, error = %e, "skipping unreadable session"),
            }
        }
        Ok(sessions)
    }

    /// Fork a session: same messages and context under a new id, with the
    /// parent recorded.  The runtime session id and stats are not carried
    /// over; the fork is an independent conversation.
    pub fn fork_session(&self, src_id: &str) -> Result<Session, SessionError> {
        let source = self
            .load_session_inner(src_id, false)?
            .ok_or_else(|| SessionError::NotFound(src_id.to_string()))?;

        let now = Utc::now();
        Ok(Session {
            id: Self::generate_session_id(),
            created_at: now,
            last_accessed_at: now,
            working_directory: source.working_directory.clone(),
            expired: false,
            sdk_session_id: None,
            parent_session_id: Some(source.id),
            stats: None,
            messages: source.messages,
            context: source.context,
        })
    }

    /// Delete all but the `keep` newest sessions by creation time.
    /// Returns how many were removed.
    pub fn clean_old_sessions(&self, keep: usize) -> Result<usize, SessionError> {
        let mut sessions = self.load_all()?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let doomed = sessions.split_off(keep.min(sessions.len()));
        for session in &doomed {
            self.delete_session(&session.id);
        }
        Ok(doomed.len())
    }

    /// Best-effort recursive removal; warns on failure, never errors.
    pub fn delete_session(&self, id: &str) {
        let dir = self.session_dir(id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(session = id, error = %e, "could not delete session directory");
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| SessionError::Json(path.display().to_string(), e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(|e| SessionError::Io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, path).map_err(|e| SessionError::Io(path.display().to_string(), e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SessionError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SessionError::Io(path.display().to_string(), e))?;
    serde_json::from_str(&text).map_err(|e| SessionError::Json(path.display().to_string(), e))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

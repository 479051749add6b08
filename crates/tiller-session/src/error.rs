// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("checkpoint '{0}' not found")]
    CheckpointNotFound(String),

    #[error("file rewind failed: {0}")]
    Rewind(String),

    #[error("could not access '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("invalid JSON in '{0}': {1}")]
    Json(String, #[source] serde_json::Error),
}

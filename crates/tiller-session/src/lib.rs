// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable conversation state: sessions persisted as per-directory JSON
//! records, and the per-session checkpoint metadata used to rewind file
//! edits back to a user-turn boundary.

mod checkpoint;
mod error;
mod session;
mod store;

pub use checkpoint::{
    checkpoint_description, CheckpointMeta, CheckpointRecorder, DEFAULT_KEEP_COUNT,
};
pub use error::SessionError;
pub use session::{ActiveAgent, Session, SessionContext, SessionStats};
pub use store::SessionStore;

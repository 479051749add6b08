// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent turn engine: owns the live input feed consumed by the external
//! runtime, drives the multi-turn streaming call, fans runtime messages out
//! to the front end, snapshots user-turn boundaries, and arbitrates
//! interruption.

pub mod classifier;
mod engine;
mod feed;
pub mod mock;
mod router;
mod ui;

pub use engine::{
    InterruptOutcome, SendOutcome, SessionStatus, TurnEngine, TurnResult, PLAN_MODE_PREFIX,
};
pub use feed::LiveMessageFeed;
pub use router::MessageRouter;
pub use ui::{InteractiveUi, Output};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The trust boundary between the agent runtime and the user: every
//! tool-use request the runtime makes is arbitrated here against the
//! current permission configuration, with UI prompts only where the policy
//! requires one.

mod arbiter;
mod matching;
pub mod mock;
mod ui;

pub use arbiter::PermissionArbiter;
pub use matching::{command_matches, tool_matches_any};
pub use ui::{
    PermissionUi, ToolPromptRequest, ToolPromptResponse, QUESTION_PROMPT_TIMEOUT,
    TOOL_PROMPT_TIMEOUT,
};

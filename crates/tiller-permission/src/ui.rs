// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// How long a yes/no tool confirmation may sit unanswered before it counts
/// as a denial.
pub const TOOL_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a multi-question prompt may sit unanswered.
pub const QUESTION_PROMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything the front end needs to render a tool-permission prompt.
#[derive(Debug, Clone)]
pub struct ToolPromptRequest {
    pub tool_name: String,
    pub tool_use_id: String,
    pub input: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolPromptResponse {
    pub approved: bool,
    pub reason: Option<String>,
    /// Remember this decision for the rest of the session (front-end owned).
    pub remember: bool,
}

/// Async prompts a front end must provide to the arbiter.
///
/// An `Err` from either method is a UI failure and aborts the current
/// tool-use on the runtime side; user rejection and user cancellation are
/// `Ok` values, never errors.
#[async_trait]
pub trait PermissionUi: Send + Sync {
    async fn prompt_tool_permission(
        &self,
        request: ToolPromptRequest,
    ) -> anyhow::Result<ToolPromptResponse>;

    /// Present the question menu.  Returns `Ok(None)` when the user cancels,
    /// `Ok(Some(map))` with one answer per question prompt otherwise.
    async fn prompt_user_questions(
        &self,
        questions: &[Value],
    ) -> anyhow::Result<Option<HashMap<String, String>>>;
}

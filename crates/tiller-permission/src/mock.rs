// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic [`PermissionUi`] doubles for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::ui::{PermissionUi, ToolPromptRequest, ToolPromptResponse};

/// Answers every prompt with a fixed response and records what was asked.
pub struct StaticPermissionUi {
    approve: bool,
    reason: Option<String>,
    answers: HashMap<String, String>,
    /// Tool names of every permission prompt, in order.
    pub prompted: Mutex<Vec<String>>,
}

impl StaticPermissionUi {
    pub fn approving() -> Self {
        Self {
            approve: true,
            reason: None,
            answers: HashMap::new(),
            prompted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: Option<&str>) -> Self {
        Self {
            approve: false,
            reason: reason.map(str::to_string),
            answers: HashMap::new(),
            prompted: Mutex::new(Vec::new()),
        }
    }

    /// Pre-load answers for the question menu, keyed by question prompt.
    pub fn with_answers(mut self, answers: HashMap<String, String>) -> Self {
        self.answers = answers;
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompted.lock().unwrap().len()
    }
}

#[async_trait]
impl PermissionUi for StaticPermissionUi {
    async fn prompt_tool_permission(
        &self,
        request: ToolPromptRequest,
    ) -> anyhow::Result<ToolPromptResponse> {
        self.prompted.lock().unwrap().push(request.tool_name);
        Ok(ToolPromptResponse {
            approved: self.approve,
            reason: self.reason.clone(),
            remember: false,
        })
    }

    async fn prompt_user_questions(
        &self,
        questions: &[Value],
    ) -> anyhow::Result<Option<HashMap<String, String>>> {
        self.prompted
            .lock()
            .unwrap()
            .push(format!("questions:{}", questions.len()));
        Ok(Some(self.answers.clone()))
    }
}

/// Cancels every question menu and rejects every tool prompt.
#[derive(Default)]
pub struct CancellingUi;

#[async_trait]
impl PermissionUi for CancellingUi {
    async fn prompt_tool_permission(
        &self,
        _request: ToolPromptRequest,
    ) -> anyhow::Result<ToolPromptResponse> {
        Ok(ToolPromptResponse::default())
    }

    async fn prompt_user_questions(
        &self,
        _questions: &[Value],
    ) -> anyhow::Result<Option<HashMap<String, String>>> {
        Ok(None)
    }
}

/// Fails every prompt, for exercising the UI-error propagation path.
#[derive(Default)]
pub struct FailingUi;

#[async_trait]
impl PermissionUi for FailingUi {
    async fn prompt_tool_permission(
        &self,
        _request: ToolPromptRequest,
    ) -> anyhow::Result<ToolPromptResponse> {
        anyhow::bail!("permission prompt surface is gone")
    }

    async fn prompt_user_questions(
        &self,
        _questions: &[Value],
    ) -> anyhow::Result<Option<HashMap<String, String>>> {
        anyhow::bail!("question menu surface is gone")
    }
}

/// Never resolves; used to exercise the prompt timeouts.
#[derive(Default)]
pub struct UnresponsiveUi;

#[async_trait]
impl PermissionUi for UnresponsiveUi {
    async fn prompt_tool_permission(
        &self,
        _request: ToolPromptRequest,
    ) -> anyhow::Result<ToolPromptResponse> {
        futures_pending().await
    }

    async fn prompt_user_questions(
        &self,
        _questions: &[Value],
    ) -> anyhow::Result<Option<HashMap<String, String>>> {
        futures_pending().await
    }
}

async fn futures_pending<T>() -> T {
    std::future::pending::<T>().await
}

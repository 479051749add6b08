// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tiller_config::PermissionMode;

use crate::query::QueryOptions;
use crate::stream::{OutboundUserMessage, RuntimeMessage};

pub type RuntimeStream = Pin<Box<dyn Stream<Item = anyhow::Result<RuntimeMessage>> + Send>>;
pub type PromptStream = Pin<Box<dyn Stream<Item = OutboundUserMessage> + Send>>;

/// The prompt argument of a runtime query: a one-shot string, or an
/// open-ended sequence of user turns (streaming input mode).
pub enum Prompt {
    Text(String),
    Stream(PromptStream),
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The arbiter's reply to a `can_use_tool` callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow {
        /// Always populated; for AskUserQuestion it carries the collected
        /// answers alongside the original questions.
        updated_input: Value,
        tool_use_id: String,
    },
    Deny {
        message: String,
        tool_use_id: String,
        /// Ask the runtime to stop the whole turn, not just this tool use.
        interrupt: bool,
    },
}

impl PermissionDecision {
    pub fn allow(updated_input: Value, tool_use_id: impl Into<String>) -> Self {
        Self::Allow {
            updated_input,
            tool_use_id: tool_use_id.into(),
        }
    }

    pub fn deny(message: impl Into<String>, tool_use_id: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            tool_use_id: tool_use_id.into(),
            interrupt: false,
        }
    }

    pub fn deny_interrupt(message: impl Into<String>, tool_use_id: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            tool_use_id: tool_use_id.into(),
            interrupt: true,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Context the runtime attaches to each `can_use_tool` callback.
#[derive(Debug, Clone)]
pub struct ToolUseContext {
    pub tool_use_id: String,
    pub cancel: CancellationToken,
}

/// The trust boundary: answers every tool-use request the runtime makes.
///
/// Implementations must be total: the only error that may propagate is a
/// failed UI prompt, which aborts the turn on the runtime side.
#[async_trait]
pub trait ToolGate: Send + Sync {
    async fn can_use_tool(
        &self,
        tool_name: &str,
        input: Value,
        ctx: ToolUseContext,
    ) -> anyhow::Result<PermissionDecision>;
}

/// A live query: the runtime's message stream plus the handle for
/// mid-query operations (mode switches, file rewind).
pub struct Query {
    pub stream: RuntimeStream,
    pub handle: Arc<dyn RuntimeHandle>,
}

/// Handle to an active (or most recent) runtime query.
#[async_trait]
pub trait RuntimeHandle: Send + Sync {
    async fn set_permission_mode(&self, mode: PermissionMode) -> anyhow::Result<()>;

    /// Rewind files edited since the checkpoint was captured.  The error
    /// message contains "no checkpoint found" when the id is unknown to the
    /// runtime.
    async fn rewind_files(&self, checkpoint_id: &str) -> anyhow::Result<()>;
}

/// The external agent runtime: a streaming multi-turn loop with built-in
/// tool dispatch.  The engine owns the cancellation token and cancels it to
/// interrupt the query; the runtime must observe cancellation within a
/// bounded number of suspension points.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn query(
        &self,
        prompt: Prompt,
        options: QueryOptions,
        gate: Arc<dyn ToolGate>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Query>;
}

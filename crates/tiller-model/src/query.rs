// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use tiller_config::{AgentDefinition, HookEvent, McpServerConfig, PermissionMode, SandboxSettings};

/// The preset system prompt hosted by the runtime.
pub const PRESET_NAME: &str = "claude_code";

/// System prompt forwarded to the runtime: either a preset descriptor with
/// an optional append string, or literal text.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemPrompt {
    Preset {
        preset: String,
        append: Option<String>,
    },
    Text(String),
}

impl SystemPrompt {
    pub fn preset(append: Option<String>) -> Self {
        Self::Preset {
            preset: PRESET_NAME.to_string(),
            append,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    User,
    Project,
    Local,
}

/// Invoked by the runtime when a hook event fires.  Hook execution itself is
/// owned by the outer driver; the core only carries the registration through
/// to the runtime.
#[async_trait]
pub trait HookCallback: Send + Sync {
    async fn run(&self, payload: Value) -> anyhow::Result<Value>;
}

/// One hook wired into the runtime's `{event → [{matcher, callback}]}` map.
#[derive(Clone)]
pub struct HookRegistration {
    pub matcher: Option<String>,
    pub callback: Arc<dyn HookCallback>,
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

/// Per-turn invocation parameters handed to the runtime's streaming entry
/// point.  Assembled by the query-options builder from the merged config,
/// the session context, and the environment.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub model: String,
    pub system_prompt: SystemPrompt,
    pub setting_sources: Vec<SettingSource>,
    /// `None` omits the field entirely so the runtime applies its default
    /// tool set; `Some` restricts to exactly the listed names.
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Vec<String>,
    pub cwd: PathBuf,
    pub permission_mode: PermissionMode,
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    pub agents: Option<HashMap<String, AgentDefinition>>,
    pub hooks: Option<HashMap<HookEvent, Vec<HookRegistration>>>,
    pub max_turns: Option<u32>,
    pub max_budget_usd: Option<f64>,
    pub max_thinking_tokens: Option<u32>,
    pub sandbox: Option<SandboxSettings>,
    pub enable_file_checkpointing: bool,
    /// Opaque flags forwarded to the runtime; a `None` value is a bare flag.
    pub extra_args: HashMap<String, Option<String>>,
    pub resume: Option<String>,
    pub resume_session_at: Option<String>,
    pub fork_session: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: SystemPrompt::preset(None),
            setting_sources: vec![SettingSource::Project],
            allowed_tools: None,
            disallowed_tools: Vec::new(),
            cwd: PathBuf::from("."),
            permission_mode: PermissionMode::Default,
            mcp_servers: None,
            agents: None,
            hooks: None,
            max_turns: None,
            max_budget_usd: None,
            max_thinking_tokens: None,
            sandbox: None,
            enable_file_checkpointing: false,
            extra_args: HashMap::new(),
            resume: None,
            resume_session_at: None,
            fork_session: false,
        }
    }
}

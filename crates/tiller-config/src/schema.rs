// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid permission mode '{0}' (expected one of: default, acceptEdits, bypassPermissions, plan)")]
    InvalidPermissionMode(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the arbiter treats tool-use requests from the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PermissionMode {
    /// Prompt for tools the catalog classifies as dangerous; allow the rest.
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Additionally auto-allow file edits (Write / Edit).
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    /// Allow everything without prompting.
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
    /// Read-only exploration: only Read / Grep / Glob / ExitPlanMode run.
    #[serde(rename = "plan")]
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }
}

impl FromStr for PermissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            "plan" => Ok(Self::Plan),
            other => Err(ConfigError::InvalidPermissionMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration the permission arbiter evaluates on every tool-use request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionConfig {
    pub mode: PermissionMode,
    /// When non-empty, tools not matching an entry are denied.
    pub allowed_tools: Vec<String>,
    /// Tools matching an entry are always denied; checked before the allow list.
    pub disallowed_tools: Vec<String>,
    /// Skip prompting entirely (AskUserQuestion still prompts).
    pub allow_dangerously_skip_permissions: bool,
    /// Shell commands auto-allowed for the Bash tool.
    pub allowed_commands: Vec<String>,
    /// Shell commands always denied for the Bash tool.
    pub disallowed_commands: Vec<String>,
}

/// A sub-agent definition, keyed by name in [`ResolvedConfig::agents`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub description: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Connection details for an external MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Lifecycle points a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    SessionStart,
    SessionEnd,
    Stop,
}

/// One hook entry as it appears in settings files.  Execution is owned by
/// the outer driver; the core only translates these into the runtime shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    pub enabled: bool,
    pub allow_network: bool,
}

/// The merged view of the user, project, and local settings layers.
///
/// Merge semantics are right-biased per field for scalars and right-biased
/// *replacement* for arrays: a later layer's array fully replaces an
/// earlier layer's, with no concatenation and no dedupe.  See
/// [`crate::resolve_layers`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedConfig {
    /// Model identifier forwarded to the runtime; falls back to the
    /// environment override and then the built-in default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub permissions: PermissionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_budget_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_thinking_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxSettings>,
    pub agents: HashMap<String, AgentDefinition>,
    pub mcp_servers: HashMap<String, McpServerConfig>,
    pub hooks: HashMap<HookEvent, Vec<HookDefinition>>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

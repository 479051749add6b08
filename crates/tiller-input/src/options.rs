// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tiller_config::{
    env, AgentDefinition, HookDefinition, HookEvent, McpServerConfig, PermissionMode,
    ResolvedConfig,
};
use tiller_model::{catalog, HookCallback, HookRegistration, QueryOptions, SystemPrompt};

/// Appended to the preset system prompt while plan mode is active.
pub const PLAN_MODE_APPEND: &str = "\
You are in plan mode. Only the Read, Grep, Glob, and ExitPlanMode tools are \
available. Explore the codebase with the read-only tools, develop a concrete \
plan, and present it with ExitPlanMode when you are confident in it. Do not \
edit files, run commands, or take any other action until the user approves \
the plan and plan mode ends.";

/// Sub-agents that ship with the engine.  Config-defined agents extend this
/// set; session-active agents override both on name collision.
pub fn builtin_agents() -> HashMap<String, AgentDefinition> {
    let mut agents = HashMap::new();
    agents.insert(
        "general-purpose".to_string(),
        AgentDefinition {
            description: "General agent for multi-step research and implementation tasks".into(),
            prompt: "You are a capable general-purpose agent. Complete the task you are \
                     given end to end and report the outcome concisely."
                .into(),
            tools: None,
            model: None,
        },
    );
    agents.insert(
        "code-reviewer".to_string(),
        AgentDefinition {
            description: "Reviews a diff or file set for correctness issues".into(),
            prompt: "You are a careful code reviewer. Read the relevant code and report \
                     concrete defects with file and line references."
                .into(),
            tools: Some(vec!["Read".into(), "Grep".into(), "Glob".into()]),
            model: None,
        },
    );
    agents
}

/// Translate settings-file hook definitions into the runtime's
/// `{event → [{matcher, callback}]}` shape.  The factory supplies the
/// callback for each definition; hook execution stays with the outer driver.
pub fn hooks_from_config(
    defs: &HashMap<HookEvent, Vec<HookDefinition>>,
    factory: impl Fn(&HookDefinition) -> Arc<dyn HookCallback>,
) -> HashMap<HookEvent, Vec<HookRegistration>> {
    defs.iter()
        .map(|(event, list)| {
            let regs = list
                .iter()
                .map(|def| HookRegistration {
                    matcher: def.matcher.clone(),
                    callback: factory(def),
                })
                .collect();
            (*event, regs)
        })
        .collect()
}

/// Everything the options builder needs for one turn.
pub struct QueryInputs<'a> {
    pub cwd: &'a Path,
    pub config: &'a ResolvedConfig,
    pub mode: PermissionMode,
    /// Agents activated at session runtime; override config and built-ins.
    pub active_agents: &'a HashMap<String, AgentDefinition>,
    /// Manager-owned MCP servers; override config entries on key collision.
    pub custom_mcp_servers: &'a HashMap<String, McpServerConfig>,
    pub hooks: HashMap<HookEvent, Vec<HookRegistration>>,
    /// Resolved once at engine construction (config/env/builtin fallback).
    pub default_model: &'a str,
}

/// Assemble the per-turn invocation parameters for the runtime.
pub fn build_query_options(inputs: QueryInputs<'_>) -> QueryOptions {
    let QueryInputs {
        cwd,
        config,
        mode,
        active_agents,
        custom_mcp_servers,
        hooks,
        default_model,
    } = inputs;

    let model = config
        .model
        .clone()
        .unwrap_or_else(|| default_model.to_string());

    let append = (mode == PermissionMode::Plan).then(|| PLAN_MODE_APPEND.to_string());

    let disallowed = config.permissions.disallowed_tools.clone();
    let allowed_tools = allowed_tool_list(config, &disallowed);

    let mut agents = builtin_agents();
    agents.extend(config.agents.clone());
    agents.extend(active_agents.clone());

    let mut mcp_servers = config.mcp_servers.clone();
    mcp_servers.extend(custom_mcp_servers.clone());

    let mut extra_args: HashMap<String, Option<String>> = HashMap::new();
    let enable_file_checkpointing = env::file_checkpointing_enabled();
    if enable_file_checkpointing {
        extra_args.insert("replay-user-messages".to_string(), None);
    }

    QueryOptions {
        model,
        system_prompt: SystemPrompt::preset(append),
        setting_sources: vec![tiller_model::SettingSource::Project],
        allowed_tools,
        disallowed_tools: disallowed,
        cwd: cwd.to_path_buf(),
        permission_mode: mode,
        mcp_servers: (!mcp_servers.is_empty()).then_some(mcp_servers),
        agents: (!agents.is_empty()).then_some(agents),
        hooks: (!hooks.is_empty()).then_some(hooks),
        max_turns: config.max_turns,
        max_budget_usd: config.max_budget_usd,
        max_thinking_tokens: config.max_thinking_tokens,
        sandbox: config.sandbox.clone(),
        enable_file_checkpointing,
        extra_args,
        resume: None,
        resume_session_at: None,
        fork_session: false,
    }
}

/// The allowed-tools field: intersect the configured list with known tools
/// and MCP-prefixed names, union in `Skill` (always) and `Task` (when
/// sub-agents exist and it is not disallowed), then subtract the disallow
/// list.  An empty configured list omits the field so the runtime applies
/// its default tool set.
fn allowed_tool_list(config: &ResolvedConfig, disallowed: &[String]) -> Option<Vec<String>> {
    let configured = &config.permissions.allowed_tools;
    if configured.is_empty() {
        return None;
    }

    let mut out: Vec<String> = configured
        .iter()
        .filter(|t| catalog::is_known(t) || catalog::is_mcp_tool(t))
        .cloned()
        .collect();

    if !out.iter().any(|t| t == "Skill") {
        out.push("Skill".to_string());
    }
    // Built-in agents always exist, so Task rides along unless disallowed.
    if !disallowed.iter().any(|t| t == "Task") && !out.iter().any(|t| t == "Task") {
        out.push("Task".to_string());
    }

    out.retain(|t| !disallowed.contains(t));
    Some(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_config::PermissionConfig;

    fn inputs<'a>(
        config: &'a ResolvedConfig,
        mode: PermissionMode,
        empty: &'a HashMap<String, AgentDefinition>,
        no_mcp: &'a HashMap<String, McpServerConfig>,
    ) -> QueryInputs<'a> {
        QueryInputs {
            cwd: Path::new("/work"),
            config,
            mode,
            active_agents: empty,
            custom_mcp_servers: no_mcp,
            hooks: HashMap::new(),
            default_model: "sonnet",
        }
    }

    #[test]
    fn default_mode_has_no_prompt_append() {
        let config = ResolvedConfig::default();
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        match opts.system_prompt {
            SystemPrompt::Preset { preset, append } => {
                assert_eq!(preset, tiller_model::PRESET_NAME);
                assert!(append.is_none());
            }
            other => panic!("expected preset prompt, got {other:?}"),
        }
    }

    #[test]
    fn plan_mode_appends_plan_prompt() {
        let config = ResolvedConfig::default();
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Plan,
            &HashMap::new(),
            &HashMap::new(),
        ));
        match opts.system_prompt {
            SystemPrompt::Preset { append, .. } => {
                let append = append.expect("plan mode must append");
                assert!(append.contains("ExitPlanMode"));
                assert!(append.contains("plan mode"));
            }
            other => panic!("expected preset prompt, got {other:?}"),
        }
        assert_eq!(opts.permission_mode, PermissionMode::Plan);
    }

    #[test]
    fn empty_allowed_tools_omits_the_field() {
        let config = ResolvedConfig::default();
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert!(opts.allowed_tools.is_none());
    }

    #[test]
    fn allowed_tools_intersect_union_subtract() {
        let config = ResolvedConfig {
            permissions: PermissionConfig {
                allowed_tools: vec![
                    "Read".into(),
                    "NotARealTool".into(),
                    "mcp__github__create_issue".into(),
                    "Bash".into(),
                ],
                disallowed_tools: vec!["Bash".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        let allowed = opts.allowed_tools.unwrap();
        assert!(allowed.contains(&"Read".to_string()));
        assert!(allowed.contains(&"mcp__github__create_issue".to_string()));
        assert!(allowed.contains(&"Skill".to_string()), "Skill always unions in");
        assert!(allowed.contains(&"Task".to_string()));
        assert!(!allowed.contains(&"NotARealTool".to_string()));
        assert!(!allowed.contains(&"Bash".to_string()), "disallow wins");
    }

    #[test]
    fn task_is_not_added_when_disallowed() {
        let config = ResolvedConfig {
            permissions: PermissionConfig {
                allowed_tools: vec!["Read".into()],
                disallowed_tools: vec!["Task".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert!(!opts.allowed_tools.unwrap().contains(&"Task".to_string()));
    }

    #[test]
    fn active_agents_override_config_and_builtins() {
        let mut config = ResolvedConfig::default();
        config.agents.insert(
            "general-purpose".into(),
            AgentDefinition {
                description: "from config".into(),
                prompt: "p".into(),
                tools: None,
                model: None,
            },
        );
        let mut active = HashMap::new();
        active.insert(
            "general-purpose".into(),
            AgentDefinition {
                description: "from session".into(),
                prompt: "p".into(),
                tools: None,
                model: None,
            },
        );
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &active,
            &HashMap::new(),
        ));
        let agents = opts.agents.unwrap();
        assert_eq!(agents["general-purpose"].description, "from session");
        assert!(agents.contains_key("code-reviewer"), "builtins survive");
    }

    #[test]
    fn custom_mcp_servers_take_precedence() {
        let mut config = ResolvedConfig::default();
        config.mcp_servers.insert(
            "github".into(),
            McpServerConfig {
                command: "from-config".into(),
                args: vec![],
                env: HashMap::new(),
            },
        );
        let mut custom = HashMap::new();
        custom.insert(
            "github".into(),
            McpServerConfig {
                command: "from-manager".into(),
                args: vec![],
                env: HashMap::new(),
            },
        );
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &custom,
        ));
        assert_eq!(opts.mcp_servers.unwrap()["github"].command, "from-manager");
    }

    #[test]
    fn no_mcp_servers_omits_the_map() {
        let config = ResolvedConfig::default();
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert!(opts.mcp_servers.is_none());
    }

    #[test]
    fn config_model_beats_default_model() {
        let config = ResolvedConfig {
            model: Some("opus".into()),
            ..Default::default()
        };
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert_eq!(opts.model, "opus");
    }

    #[test]
    fn checkpointing_flag_drives_extras() {
        std::env::set_var(env::ENV_FILE_CHECKPOINTING, "1");
        let config = ResolvedConfig::default();
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert!(opts.enable_file_checkpointing);
        assert!(opts.extra_args.contains_key("replay-user-messages"));
        assert_eq!(opts.extra_args["replay-user-messages"], None);

        std::env::remove_var(env::ENV_FILE_CHECKPOINTING);
        let opts = build_query_options(inputs(
            &config,
            PermissionMode::Default,
            &HashMap::new(),
            &HashMap::new(),
        ));
        assert!(!opts.enable_file_checkpointing);
        assert!(opts.extra_args.is_empty());
    }
}

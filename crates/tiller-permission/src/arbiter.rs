// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use tiller_config::{PermissionConfig, PermissionMode};
use tiller_model::{
    catalog, PermissionDecision, RuntimeHandle, ToolGate, ToolUseContext,
};

use crate::matching::{command_matches, tool_matches_any};
use crate::ui::{
    PermissionUi, ToolPromptRequest, QUESTION_PROMPT_TIMEOUT, TOOL_PROMPT_TIMEOUT,
};

const ASK_USER_QUESTION: &str = "AskUserQuestion";
const DENIED_FALLBACK: &str = "User denied permission";

/// Answers the runtime's `can_use_tool` callbacks.
///
/// The decision procedure is total and deterministic given the current
/// configuration; the only side effect is the UI prompt it explicitly
/// requests, and the only error that escapes is a failed prompt.
pub struct PermissionArbiter {
    config: RwLock<PermissionConfig>,
    handle: RwLock<Option<Arc<dyn RuntimeHandle>>>,
    ui: Arc<dyn PermissionUi>,
}

impl PermissionArbiter {
    pub fn new(config: PermissionConfig, ui: Arc<dyn PermissionUi>) -> Self {
        Self {
            config: RwLock::new(config),
            handle: RwLock::new(None),
            ui,
        }
    }

    /// Store the runtime handle used for dynamic mode switches.  The engine
    /// owns the handle; the arbiter only borrows it.
    pub fn register_handle(&self, handle: Arc<dyn RuntimeHandle>) {
        *self.handle.write().unwrap() = Some(handle);
    }

    pub fn mode(&self) -> PermissionMode {
        self.config.read().unwrap().mode
    }

    pub fn config(&self) -> PermissionConfig {
        self.config.read().unwrap().clone()
    }

    pub fn set_config(&self, config: PermissionConfig) {
        *self.config.write().unwrap() = config;
    }

    /// Switch the permission mode.
    ///
    /// The local mode is updated first, so the very next `can_use_tool`
    /// call already sees the new mode; the runtime handle (when registered)
    /// is told afterwards.  A failing runtime call leaves the local mode in
    /// place; surfacing the divergence is the front end's job.
    pub async fn set_mode(&self, mode: PermissionMode) -> anyhow::Result<()> {
        self.config.write().unwrap().mode = mode;
        debug!(mode = %mode, "permission mode updated");

        let handle = self.handle.read().unwrap().clone();
        if let Some(handle) = handle {
            if let Err(e) = handle.set_permission_mode(mode).await {
                warn!(mode = %mode, error = %e, "runtime rejected mode change");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn decide(
        &self,
        tool_name: &str,
        input: Value,
        ctx: ToolUseContext,
    ) -> anyhow::Result<PermissionDecision> {
        let cfg = self.config();
        let id = ctx.tool_use_id.clone();

        if ctx.cancel.is_cancelled() {
            return Ok(PermissionDecision::deny_interrupt("Request aborted", id));
        }

        if tool_matches_any(&cfg.disallowed_tools, tool_name) {
            return Ok(PermissionDecision::deny(
                format!("Tool '{tool_name}' is in disallowed list"),
                id,
            ));
        }

        if !cfg.allowed_tools.is_empty() && !tool_matches_any(&cfg.allowed_tools, tool_name) {
            return Ok(PermissionDecision::deny(
                format!("Tool '{tool_name}' is not in allowed list"),
                id,
            ));
        }

        // Skipping permissions never skips the question menu: AskUserQuestion
        // exists to collect user input, not to be waved through.
        if cfg.allow_dangerously_skip_permissions && tool_name != ASK_USER_QUESTION {
            return Ok(PermissionDecision::allow(input, id));
        }

        if tool_name == ASK_USER_QUESTION {
            return self.question_path(input, id).await;
        }

        if tool_name == "Bash" {
            if let Some(command) = input.get("command").and_then(Value::as_str) {
                if cfg
                    .disallowed_commands
                    .iter()
                    .any(|p| command_matches(p, command, true))
                {
                    return Ok(PermissionDecision::deny(
                        format!("Command '{command}' matches a disallowed pattern"),
                        id,
                    ));
                }
                if cfg
                    .allowed_commands
                    .iter()
                    .any(|p| command_matches(p, command, false))
                {
                    return Ok(PermissionDecision::allow(input, id));
                }
            }
        }

        match cfg.mode {
            PermissionMode::BypassPermissions => Ok(PermissionDecision::allow(input, id)),
            PermissionMode::AcceptEdits => {
                if catalog::is_edit_tool(tool_name) || !catalog::is_dangerous(tool_name) {
                    Ok(PermissionDecision::allow(input, id))
                } else {
                    self.prompt_path(tool_name, input, id).await
                }
            }
            PermissionMode::Plan => {
                if catalog::is_plan_safe(tool_name) {
                    Ok(PermissionDecision::allow(input, id))
                } else {
                    Ok(PermissionDecision::deny(
                        "Plan mode: tool execution disabled",
                        id,
                    ))
                }
            }
            PermissionMode::Default => {
                if catalog::is_dangerous(tool_name) {
                    self.prompt_path(tool_name, input, id).await
                } else {
                    Ok(PermissionDecision::allow(input, id))
                }
            }
        }
    }

    /// Ask the front end for confirmation.  Prompt expiry counts as denial;
    /// a UI failure propagates and aborts the turn.
    async fn prompt_path(
        &self,
        tool_name: &str,
        input: Value,
        tool_use_id: String,
    ) -> anyhow::Result<PermissionDecision> {
        let request = ToolPromptRequest {
            tool_name: tool_name.to_string(),
            tool_use_id: tool_use_id.clone(),
            input: input.clone(),
            timestamp: Utc::now(),
        };
        let response =
            match tokio::time::timeout(TOOL_PROMPT_TIMEOUT, self.ui.prompt_tool_permission(request))
                .await
            {
                Err(_elapsed) => {
                    warn!(tool = tool_name, "permission prompt timed out");
                    return Ok(PermissionDecision::deny(DENIED_FALLBACK, tool_use_id));
                }
                Ok(result) => result?,
            };

        if response.approved {
            Ok(PermissionDecision::allow(input, tool_use_id))
        } else {
            let message = response
                .reason
                .unwrap_or_else(|| DENIED_FALLBACK.to_string());
            Ok(PermissionDecision::deny(message, tool_use_id))
        }
    }

    /// Run the question menu and fold the answers into the updated input.
    async fn question_path(
        &self,
        input: Value,
        tool_use_id: String,
    ) -> anyhow::Result<PermissionDecision> {
        let questions = match input.get("questions").and_then(Value::as_array) {
            Some(qs) if !qs.is_empty() => qs.clone(),
            _ => {
                return Ok(PermissionDecision::deny(
                    "AskUserQuestion requires a non-empty questions array",
                    tool_use_id,
                ));
            }
        };

        let answers = match tokio::time::timeout(
            QUESTION_PROMPT_TIMEOUT,
            self.ui.prompt_user_questions(&questions),
        )
        .await
        {
            Err(_elapsed) => {
                warn!("question prompt timed out");
                return Ok(PermissionDecision::deny(DENIED_FALLBACK, tool_use_id));
            }
            Ok(result) => result?,
        };

        match answers {
            Some(answers) => Ok(PermissionDecision::allow(
                json!({ "questions": questions, "answers": answers }),
                tool_use_id,
            )),
            None => Ok(PermissionDecision::deny(
                "Questions cancelled by user",
                tool_use_id,
            )),
        }
    }
}

#[async_trait]
impl ToolGate for PermissionArbiter {
    async fn can_use_tool(
        &self,
        tool_name: &str,
        input: Value,
        ctx: ToolUseContext,
    ) -> anyhow::Result<PermissionDecision> {
        self.decide(tool_name, input, ctx).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CancellingUi, FailingUi, StaticPermissionUi, UnresponsiveUi};
    use std::collections::HashMap;
    use tiller_model::mock::RecordingHandle;
    use tokio_util::sync::CancellationToken;

    fn ctx(id: &str) -> ToolUseContext {
        ToolUseContext {
            tool_use_id: id.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    fn arbiter(config: PermissionConfig, ui: Arc<dyn PermissionUi>) -> PermissionArbiter {
        PermissionArbiter::new(config, ui)
    }

    fn deny_message(decision: &PermissionDecision) -> &str {
        match decision {
            PermissionDecision::Deny { message, .. } => message,
            other => panic!("expected deny, got {other:?}"),
        }
    }

    // ── Early outs ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn asserted_cancel_denies_with_interrupt() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        let token = CancellationToken::new();
        token.cancel();
        let d = a
            .can_use_tool(
                "Read",
                json!({}),
                ToolUseContext {
                    tool_use_id: "T0".into(),
                    cancel: token,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            d,
            PermissionDecision::deny_interrupt("Request aborted", "T0")
        );
    }

    #[tokio::test]
    async fn disallowed_list_wins_over_everything() {
        let ui = Arc::new(StaticPermissionUi::approving());
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::BypassPermissions,
                disallowed_tools: vec!["Bash".into()],
                ..Default::default()
            },
            ui.clone(),
        );
        let d = a.can_use_tool("Bash", json!({}), ctx("T1")).await.unwrap();
        assert!(deny_message(&d).contains("is in disallowed list"));
        assert_eq!(ui.prompt_count(), 0);
    }

    #[tokio::test]
    async fn mcp_module_wildcard_disallow_denies_every_server_tool() {
        let a = arbiter(
            PermissionConfig {
                disallowed_tools: vec!["mcp__github".into()],
                ..Default::default()
            },
            Arc::new(StaticPermissionUi::approving()),
        );
        let d = a
            .can_use_tool("mcp__github__create_issue", json!({}), ctx("T3"))
            .await
            .unwrap();
        assert!(deny_message(&d).contains("is in disallowed list"));
    }

    #[tokio::test]
    async fn missing_from_non_empty_allow_list_denies() {
        let a = arbiter(
            PermissionConfig {
                allowed_tools: vec!["Read".into()],
                ..Default::default()
            },
            Arc::new(StaticPermissionUi::approving()),
        );
        let d = a.can_use_tool("Grep", json!({}), ctx("T4")).await.unwrap();
        assert!(deny_message(&d).contains("is not in allowed list"));

        let allowed = a.can_use_tool("Read", json!({}), ctx("T5")).await.unwrap();
        assert!(allowed.is_allow());
    }

    // ── Skip-permissions flag ─────────────────────────────────────────────────

    #[tokio::test]
    async fn skip_flag_allows_dangerous_without_prompt() {
        let ui = Arc::new(StaticPermissionUi::approving());
        let a = arbiter(
            PermissionConfig {
                allow_dangerously_skip_permissions: true,
                ..Default::default()
            },
            ui.clone(),
        );
        let input = json!({ "command": "rm -rf build" });
        let d = a
            .can_use_tool("Bash", input.clone(), ctx("T6"))
            .await
            .unwrap();
        assert_eq!(d, PermissionDecision::allow(input, "T6"));
        assert_eq!(ui.prompt_count(), 0);
    }

    #[tokio::test]
    async fn skip_flag_still_routes_questions_to_the_menu() {
        let mut answers = HashMap::new();
        answers.insert("Which one?".to_string(), "B".to_string());
        let ui = Arc::new(StaticPermissionUi::approving().with_answers(answers));
        let a = arbiter(
            PermissionConfig {
                allow_dangerously_skip_permissions: true,
                ..Default::default()
            },
            ui.clone(),
        );
        let d = a
            .can_use_tool(
                "AskUserQuestion",
                json!({ "questions": [{ "prompt": "Which one?", "options": ["A", "B"] }] }),
                ctx("T7"),
            )
            .await
            .unwrap();
        match d {
            PermissionDecision::Allow { updated_input, .. } => {
                assert_eq!(updated_input["answers"]["Which one?"], "B");
                assert!(updated_input["questions"].is_array());
            }
            other => panic!("expected allow, got {other:?}"),
        }
        assert_eq!(ui.prompt_count(), 1);
    }

    // ── Bash command patterns ─────────────────────────────────────────────────

    #[tokio::test]
    async fn disallowed_command_denies_even_in_bypass_mode() {
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::BypassPermissions,
                disallowed_commands: vec!["rm -rf".into()],
                ..Default::default()
            },
            Arc::new(StaticPermissionUi::approving()),
        );
        let d = a
            .can_use_tool("Bash", json!({ "command": "sudo rm -rf /" }), ctx("T8"))
            .await
            .unwrap();
        assert!(deny_message(&d).contains("disallowed pattern"));
    }

    #[tokio::test]
    async fn allowed_command_skips_the_prompt_in_default_mode() {
        let ui = Arc::new(StaticPermissionUi::rejecting(None));
        let a = arbiter(
            PermissionConfig {
                allowed_commands: vec!["git *".into()],
                ..Default::default()
            },
            ui.clone(),
        );
        let d = a
            .can_use_tool("Bash", json!({ "command": "git status" }), ctx("T9"))
            .await
            .unwrap();
        assert!(d.is_allow());
        assert_eq!(ui.prompt_count(), 0);
    }

    // ── Mode routing ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn bypass_mode_allows_dangerous_tools() {
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::BypassPermissions,
                ..Default::default()
            },
            Arc::new(StaticPermissionUi::rejecting(None)),
        );
        let d = a
            .can_use_tool("Write", json!({ "path": "x" }), ctx("T10"))
            .await
            .unwrap();
        assert!(d.is_allow());
    }

    #[tokio::test]
    async fn accept_edits_allows_edits_but_still_prompts_for_bash() {
        let ui = Arc::new(StaticPermissionUi::approving());
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::AcceptEdits,
                ..Default::default()
            },
            ui.clone(),
        );
        let write = a
            .can_use_tool("Write", json!({ "path": "x", "content": "y" }), ctx("T11"))
            .await
            .unwrap();
        assert!(write.is_allow());
        assert_eq!(ui.prompt_count(), 0);

        let bash = a
            .can_use_tool("Bash", json!({ "command": "make" }), ctx("T12"))
            .await
            .unwrap();
        assert!(bash.is_allow());
        assert_eq!(ui.prompt_count(), 1, "Bash must go through the prompt");
    }

    #[tokio::test]
    async fn plan_mode_blocks_writes_without_prompting() {
        let ui = Arc::new(StaticPermissionUi::approving());
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::Plan,
                ..Default::default()
            },
            ui.clone(),
        );
        let d = a
            .can_use_tool("Write", json!({ "path": "x", "content": "y" }), ctx("T2"))
            .await
            .unwrap();
        assert_eq!(
            d,
            PermissionDecision::deny("Plan mode: tool execution disabled", "T2")
        );
        assert_eq!(ui.prompt_count(), 0);
    }

    #[tokio::test]
    async fn plan_mode_never_allows_tools_outside_the_read_only_set() {
        let a = arbiter(
            PermissionConfig {
                mode: PermissionMode::Plan,
                ..Default::default()
            },
            Arc::new(StaticPermissionUi::approving()),
        );
        for tool in catalog::KNOWN_TOOLS {
            // AskUserQuestion is user interaction itself, not tool execution,
            // and is resolved before mode routing.
            if *tool == ASK_USER_QUESTION {
                continue;
            }
            let d = a.can_use_tool(tool, json!({}), ctx("Tp")).await.unwrap();
            let should_allow = catalog::PLAN_MODE_TOOLS.contains(tool);
            assert_eq!(
                d.is_allow(),
                should_allow,
                "plan mode decision for {tool} is wrong"
            );
        }
    }

    #[tokio::test]
    async fn default_mode_prompts_for_dangerous_and_allows_the_rest() {
        let ui = Arc::new(StaticPermissionUi::approving());
        let a = arbiter(PermissionConfig::default(), ui.clone());

        let read = a.can_use_tool("Read", json!({}), ctx("T13")).await.unwrap();
        assert!(read.is_allow());
        assert_eq!(ui.prompt_count(), 0);

        let input = json!({ "command": "ls" });
        let bash = a
            .can_use_tool("Bash", input.clone(), ctx("T1"))
            .await
            .unwrap();
        assert_eq!(bash, PermissionDecision::allow(input, "T1"));
        assert_eq!(ui.prompt_count(), 1);
        assert_eq!(ui.prompted.lock().unwrap().as_slice(), ["Bash"]);
    }

    #[tokio::test]
    async fn rejection_reason_is_carried_through() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::rejecting(Some("not on my machine"))),
        );
        let d = a
            .can_use_tool("Bash", json!({ "command": "ls" }), ctx("T14"))
            .await
            .unwrap();
        assert_eq!(deny_message(&d), "not on my machine");
    }

    #[tokio::test]
    async fn rejection_without_reason_uses_the_fallback() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::rejecting(None)),
        );
        let d = a
            .can_use_tool("Bash", json!({ "command": "ls" }), ctx("T15"))
            .await
            .unwrap();
        assert_eq!(deny_message(&d), DENIED_FALLBACK);
    }

    // ── Prompt failure modes ──────────────────────────────────────────────────

    #[tokio::test]
    async fn ui_failure_propagates_as_error() {
        let a = arbiter(PermissionConfig::default(), Arc::new(FailingUi));
        let result = a
            .can_use_tool("Bash", json!({ "command": "ls" }), ctx("T16"))
            .await;
        assert!(result.is_err(), "UI errors must not be masked as deny");
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_timeout_counts_as_denial() {
        let a = arbiter(PermissionConfig::default(), Arc::new(UnresponsiveUi));
        let d = a
            .can_use_tool("Bash", json!({ "command": "ls" }), ctx("T17"))
            .await
            .unwrap();
        assert_eq!(deny_message(&d), DENIED_FALLBACK);
    }

    // ── AskUserQuestion ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_questions_array_is_denied() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        let d = a
            .can_use_tool("AskUserQuestion", json!({ "questions": [] }), ctx("T18"))
            .await
            .unwrap();
        assert!(deny_message(&d).contains("non-empty questions array"));

        let d = a
            .can_use_tool("AskUserQuestion", json!({}), ctx("T19"))
            .await
            .unwrap();
        assert!(deny_message(&d).contains("non-empty questions array"));
    }

    #[tokio::test]
    async fn cancelled_question_menu_is_denied_not_an_error() {
        let a = arbiter(PermissionConfig::default(), Arc::new(CancellingUi));
        let d = a
            .can_use_tool(
                "AskUserQuestion",
                json!({ "questions": [{ "prompt": "?" }] }),
                ctx("T20"),
            )
            .await
            .unwrap();
        assert!(deny_message(&d).contains("cancelled"));
    }

    // ── Dynamic mode switching ────────────────────────────────────────────────

    #[tokio::test]
    async fn set_mode_takes_effect_on_the_next_decision() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        a.set_mode(PermissionMode::Plan).await.unwrap();
        let d = a
            .can_use_tool("Write", json!({}), ctx("T21"))
            .await
            .unwrap();
        assert!(!d.is_allow());
    }

    #[tokio::test]
    async fn set_mode_pushes_to_the_registered_handle() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        let handle = Arc::new(RecordingHandle::default());
        a.register_handle(handle.clone());

        a.set_mode(PermissionMode::AcceptEdits).await.unwrap();
        assert_eq!(handle.last_mode(), Some(PermissionMode::AcceptEdits));
        assert_eq!(a.mode(), PermissionMode::AcceptEdits);
    }

    #[tokio::test]
    async fn set_mode_keeps_local_mode_when_the_runtime_rejects() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        let handle = Arc::new(RecordingHandle::default());
        handle.fail_mode_changes();
        a.register_handle(handle);

        let result = a.set_mode(PermissionMode::Plan).await;
        assert!(result.is_err());
        assert_eq!(a.mode(), PermissionMode::Plan, "local write sticks");
    }

    #[tokio::test]
    async fn set_mode_is_idempotent() {
        let a = arbiter(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        );
        let handle = Arc::new(RecordingHandle::default());
        a.register_handle(handle.clone());

        a.set_mode(PermissionMode::Plan).await.unwrap();
        a.set_mode(PermissionMode::Plan).await.unwrap();
        assert_eq!(a.mode(), PermissionMode::Plan);
        let d = a
            .can_use_tool("Bash", json!({ "command": "ls" }), ctx("T22"))
            .await
            .unwrap();
        assert!(!d.is_allow());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use tiller_config::PermissionMode;
use tiller_session::CheckpointMeta;

/// The event sink a front end implements; the engine's dispatcher fans
/// every runtime message out through these calls, in stream order.
///
/// Sink methods default to no-ops so a front end only implements what it
/// renders.  Menu methods return `None` when the user dismisses the menu.
#[async_trait]
pub trait InteractiveUi: Send + Sync {
    async fn display_message(&self, _text: &str) {}
    async fn display_thinking(&self, _text: &str) {}
    async fn display_tool_use(&self, _name: &str, _tool_use_id: &str, _input: &Value) {}
    async fn display_tool_result(&self, _tool_name: &str, _content: &str, _is_error: bool) {}
    async fn display_computing(&self) {}
    async fn stop_computing(&self) {}
    async fn display_error(&self, _text: &str) {}
    async fn display_warning(&self, _text: &str) {}
    async fn display_success(&self, _text: &str) {}
    async fn display_info(&self, _text: &str) {}
    async fn set_processing_state(&self, _processing: bool) {}
    async fn display_permission_status(&self, _status: &str) {}
    async fn set_initial_permission_mode(&self, _mode: PermissionMode) {}
    async fn set_permission_mode(&self, _mode: PermissionMode) {}
    async fn display_todo_list(&self, _todos: &[Value]) {}

    async fn prompt_confirmation(&self, _question: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    /// Pick a session from `summaries`; returns the chosen index.
    async fn show_session_menu(&self, _summaries: &[String]) -> anyhow::Result<Option<usize>> {
        Ok(None)
    }

    /// Pick a checkpoint to rewind to; returns the chosen checkpoint id.
    async fn show_rewind_menu(
        &self,
        _checkpoints: &[CheckpointMeta],
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn show_confirmation_menu(
        &self,
        _title: &str,
        _options: &[String],
    ) -> anyhow::Result<Option<usize>> {
        Ok(None)
    }
}

/// Plain text output, independent of any interactive surface.
pub trait Output: Send + Sync {
    fn info(&self, text: &str);
    fn warn(&self, text: &str);
    fn error(&self, text: &str);
    fn success(&self, text: &str);
    fn section(&self, title: &str);
    fn blank(&self);
}

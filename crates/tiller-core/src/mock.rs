// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Recording front-end doubles for engine and dispatcher tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use tiller_config::PermissionMode;

use crate::ui::InteractiveUi;

/// Everything a [`RecordingUi`] observes, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Message(String),
    Thinking(String),
    ToolUse { name: String, tool_use_id: String },
    ToolResult { tool_name: String, is_error: bool },
    Error(String),
    Warning(String),
    Info(String),
    Success(String),
    ProcessingState(bool),
    PermissionMode(PermissionMode),
}

/// An [`InteractiveUi`] that records every sink call.
#[derive(Default)]
pub struct RecordingUi {
    pub events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Message(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl InteractiveUi for RecordingUi {
    async fn display_message(&self, text: &str) {
        self.record(UiEvent::Message(text.to_string()));
    }

    async fn display_thinking(&self, text: &str) {
        self.record(UiEvent::Thinking(text.to_string()));
    }

    async fn display_tool_use(&self, name: &str, tool_use_id: &str, _input: &Value) {
        self.record(UiEvent::ToolUse {
            name: name.to_string(),
            tool_use_id: tool_use_id.to_string(),
        });
    }

    async fn display_tool_result(&self, tool_name: &str, _content: &str, is_error: bool) {
        self.record(UiEvent::ToolResult {
            tool_name: tool_name.to_string(),
            is_error,
        });
    }

    async fn display_error(&self, text: &str) {
        self.record(UiEvent::Error(text.to_string()));
    }

    async fn display_warning(&self, text: &str) {
        self.record(UiEvent::Warning(text.to_string()));
    }

    async fn display_info(&self, text: &str) {
        self.record(UiEvent::Info(text.to_string()));
    }

    async fn display_success(&self, text: &str) {
        self.record(UiEvent::Success(text.to_string()));
    }

    async fn set_processing_state(&self, processing: bool) {
        self.record(UiEvent::ProcessingState(processing));
    }

    async fn set_permission_mode(&self, mode: PermissionMode) {
        self.record(UiEvent::PermissionMode(mode));
    }
}

/// A front end that renders nothing.
#[derive(Default)]
pub struct NullUi;

#[async_trait]
impl InteractiveUi for NullUi {}

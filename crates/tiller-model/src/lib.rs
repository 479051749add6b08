// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Core data model and the contract with the external agent runtime.
//!
//! The runtime itself (model calls, tool dispatch, file rewind) lives behind
//! the [`AgentRuntime`] trait; everything in this crate is either a message
//! shape that crosses that boundary or a type the rest of the workspace
//! shares.

pub mod catalog;
pub mod mock;
mod query;
mod runtime;
mod stream;
mod types;

pub use query::{
    HookCallback, HookRegistration, QueryOptions, SettingSource, SystemPrompt, PRESET_NAME,
};
pub use runtime::{
    AgentRuntime, PermissionDecision, Prompt, PromptStream, Query, RuntimeHandle, RuntimeStream,
    ToolGate, ToolUseContext,
};
pub use stream::{
    AssistantMessage, AssistantPayload, OutboundUserMessage, ResultMessage, ResultUsage,
    RuntimeMessage, StreamMessage, SystemMessage, UserMessage, UserPayload,
};
pub use types::{BlockContent, ContentBlock, Message, MessageContent, Role, UsageStats};

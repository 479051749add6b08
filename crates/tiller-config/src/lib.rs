// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Configuration types for the tiller control plane.
//!
//! Holds the permission configuration consumed by the arbiter, the resolved
//! project configuration consumed by the query-options builder, the
//! three-layer merge (user < project < local), and the environment-variable
//! lookups shared across the workspace.

pub mod env;
mod loader;
mod merge;
mod schema;

pub use loader::{layer_paths, load_resolved, read_layer};
pub use merge::{merge_value, resolve_layers};
pub use schema::{
    AgentDefinition, ConfigError, HookDefinition, HookEvent, McpServerConfig, PermissionConfig,
    PermissionMode, ResolvedConfig, SandboxSettings,
};

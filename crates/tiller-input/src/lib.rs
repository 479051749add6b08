// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turns raw user text into the per-turn payload the agent runtime expects:
//! image-reference expansion into content blocks, and assembly of the
//! per-turn [`tiller_model::QueryOptions`].

mod builder;
mod options;
mod refs;

pub use builder::{build_stream_message, BuiltMessage, ImageRefError};
pub use options::{
    build_query_options, builtin_agents, hooks_from_config, QueryInputs, PLAN_MODE_APPEND,
};
pub use refs::{extract_image_refs, ImageReference};

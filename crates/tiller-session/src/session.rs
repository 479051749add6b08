// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tiller_config::{AgentDefinition, ResolvedConfig};
use tiller_model::{Message, MessageContent, Role};

/// A sub-agent activated for this session at runtime; overrides config and
/// built-in agents of the same name when query options are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAgent {
    pub name: String,
    pub agent: AgentDefinition,
}

/// Per-session context persisted alongside the message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionContext {
    pub working_directory: PathBuf,
    pub resolved_config: ResolvedConfig,
    pub active_agents: Vec<ActiveAgent>,
}

/// Aggregated totals folded from the message log on every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub message_count: usize,
    pub last_message_preview: String,
}

impl SessionStats {
    /// Fold the stats from a message log.
    pub fn compute(messages: &[Message]) -> Self {
        let mut stats = SessionStats {
            message_count: messages.len(),
            ..Default::default()
        };
        for m in messages {
            if let Some(usage) = &m.usage {
                stats.input_tokens += usage.input_tokens;
                stats.output_tokens += usage.output_tokens;
                stats.cost_usd += usage.cost_usd;
            }
        }
        if let Some(last) = messages.last() {
            stats.last_message_preview = last.preview(80);
        }
        stats
    }
}

/// One durable conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub working_directory: PathBuf,
    /// Monotone: once a session is expired it stays expired, including
    /// manual expiration marks.
    pub expired: bool,
    /// The runtime's own session id, set on the first `system.init`.
    /// Never copied into forks.
    pub sdk_session_id: Option<String>,
    pub parent_session_id: Option<String>,
    pub stats: Option<SessionStats>,
    pub messages: Vec<Message>,
    pub context: SessionContext,
}

impl Session {
    /// Append a message with a fresh id and timestamp, bumping the access
    /// time.  Persistence is the caller's responsibility.
    pub fn add_message(&mut self, role: Role, content: MessageContent) -> &Message {
        let message = Message::new(role, content);
        self.messages.push(message);
        self.last_accessed_at = Utc::now();
        self.messages.last().expect("just pushed")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tiller_model::UsageStats;

    fn usage(input: u64, output: u64, cost: f64) -> Option<UsageStats> {
        Some(UsageStats {
            input_tokens: input,
            output_tokens: output,
            cost_usd: cost,
            duration_ms: 10,
        })
    }

    #[test]
    fn stats_fold_usage_across_messages() {
        let mut a = Message::assistant("one");
        a.usage = usage(10, 3, 0.001);
        let mut b = Message::assistant("two");
        b.usage = usage(20, 7, 0.002);
        let messages = vec![Message::user("hi"), a, b];

        let stats = SessionStats::compute(&messages);
        assert_eq!(stats.input_tokens, 30);
        assert_eq!(stats.output_tokens, 10);
        assert!((stats.cost_usd - 0.003).abs() < 1e-9);
        assert_eq!(stats.message_count, 3);
        assert_eq!(stats.last_message_preview, "two");
    }

    #[test]
    fn stats_of_empty_log_are_zero_with_empty_preview() {
        let stats = SessionStats::compute(&[]);
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.last_message_preview, "");
    }

    #[test]
    fn preview_is_first_eighty_chars_of_last_message() {
        let long = "x".repeat(200);
        let messages = vec![Message::user(long)];
        let stats = SessionStats::compute(&messages);
        assert_eq!(stats.last_message_preview.len(), 80);
    }
}

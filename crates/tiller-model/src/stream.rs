// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageContent, Role};

// ─── Outgoing user turns ──────────────────────────────────────────────────────

/// The payload of a user turn as the runtime expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub role: Role,
    pub content: MessageContent,
}

/// The in-process record the live feed yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    User { message: UserPayload },
}

impl StreamMessage {
    pub fn user(content: MessageContent) -> Self {
        Self::User {
            message: UserPayload {
                role: Role::User,
                content,
            },
        }
    }

    pub fn payload(&self) -> &UserPayload {
        match self {
            Self::User { message } => message,
        }
    }
}

/// A [`StreamMessage`] adapted for the runtime's streaming-input mode:
/// stamped with the current runtime session id and a null parent tool-use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundUserMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
    pub message: UserPayload,
}

impl OutboundUserMessage {
    pub fn adapt(msg: StreamMessage, session_id: Option<String>) -> Self {
        let StreamMessage::User { message } = msg;
        Self {
            kind: "user".to_string(),
            session_id,
            parent_tool_use_id: None,
            message,
        }
    }
}

// ─── Incoming runtime messages ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantPayload {
    pub content: Vec<crate::ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: AssistantPayload,
}

/// A user-role message observed on the runtime stream: tool results fed back
/// into the loop, and echoes of the turns we sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub message: UserPayload,
}

impl UserMessage {
    /// True for echoes of locally generated turns: a fresh uuid and no
    /// tool_result blocks.  These are the checkpoint trigger points.
    pub fn is_local_turn_echo(&self) -> bool {
        self.uuid.is_some() && !self.message.content.has_tool_result()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub usage: Option<ResultUsage>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ResultMessage {
    pub fn is_success(&self) -> bool {
        self.subtype == "success"
    }
}

/// Every message kind the runtime emits on its stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
}

impl RuntimeMessage {
    pub fn system_init(session_id: impl Into<String>) -> Self {
        Self::System(SystemMessage {
            subtype: "init".into(),
            session_id: Some(session_id.into()),
        })
    }

    pub fn assistant_text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage {
            session_id: Some(session_id.into()),
            message: AssistantPayload {
                content: vec![crate::ContentBlock::text(text)],
            },
        })
    }

    pub fn user_echo(session_id: impl Into<String>, content: MessageContent) -> Self {
        Self::User(UserMessage {
            session_id: Some(session_id.into()),
            uuid: Some(Uuid::new_v4().to_string()),
            message: UserPayload {
                role: Role::User,
                content,
            },
        })
    }

    pub fn result_success(
        session_id: impl Into<String>,
        result: impl Into<String>,
        total_cost_usd: f64,
        duration_ms: u64,
        usage: ResultUsage,
    ) -> Self {
        Self::Result(ResultMessage {
            subtype: "success".into(),
            session_id: Some(session_id.into()),
            result: Some(result.into()),
            total_cost_usd: Some(total_cost_usd),
            duration_ms: Some(duration_ms),
            usage: Some(usage),
            errors: Vec::new(),
        })
    }

    pub fn result_error(subtype: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Result(ResultMessage {
            subtype: subtype.into(),
            session_id: None,
            result: None,
            total_cost_usd: None,
            duration_ms: None,
            usage: None,
            errors,
        })
    }

    /// The runtime session id carried by this message, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(m) => m.session_id.as_deref(),
            Self::Assistant(m) => m.session_id.as_deref(),
            Self::User(m) => m.session_id.as_deref(),
            Self::Result(m) => m.session_id.as_deref(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

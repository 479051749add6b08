// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use tiller_config::PermissionMode;
use tiller_model::{BlockContent, ContentBlock, RuntimeMessage};
use tiller_permission::PermissionArbiter;
use tiller_session::{checkpoint_description, CheckpointMeta, CheckpointRecorder, SessionError};
use tiller_model::RuntimeHandle;

use crate::ui::InteractiveUi;

/// Fans each runtime message out to the front end, feeds the checkpoint
/// recorder on user-turn echoes, and routes mode changes to the arbiter.
///
/// Dispatch is strictly sequential: the engine awaits each `dispatch`
/// before consuming the next runtime message, so front-end callbacks are
/// observed in stream order.
pub struct MessageRouter {
    ui: Arc<dyn InteractiveUi>,
    arbiter: Arc<PermissionArbiter>,
    recorder: Mutex<Option<CheckpointRecorder>>,
    /// tool_use id → tool name, for labelling tool results.
    tool_names: std::sync::Mutex<HashMap<String, String>>,
}

impl MessageRouter {
    pub fn new(ui: Arc<dyn InteractiveUi>, arbiter: Arc<PermissionArbiter>) -> Self {
        Self {
            ui,
            arbiter,
            recorder: Mutex::new(None),
            tool_names: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn attach_recorder(&self, recorder: CheckpointRecorder) {
        *self.recorder.lock().await = Some(recorder);
    }

    pub async fn detach_recorder(&self) {
        *self.recorder.lock().await = None;
        self.reset();
    }

    /// Forget per-call bookkeeping (the tool-use map).
    pub fn reset(&self) {
        self.tool_names.lock().unwrap().clear();
    }

    /// Switch the permission mode: arbiter first (which pushes to the
    /// runtime handle when one is registered), then the front end.
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> anyhow::Result<()> {
        let result = self.arbiter.set_mode(mode).await;
        self.ui.set_permission_mode(mode).await;
        result
    }

    pub async fn list_checkpoints(&self) -> Vec<CheckpointMeta> {
        match self.recorder.lock().await.as_ref() {
            Some(recorder) => recorder.list(),
            None => Vec::new(),
        }
    }

    pub async fn restore_checkpoint(
        &self,
        checkpoint_id: &str,
        handle: Arc<dyn RuntimeHandle>,
    ) -> Result<(), SessionError> {
        let guard = self.recorder.lock().await;
        match guard.as_ref() {
            Some(recorder) => recorder.restore(checkpoint_id, handle.as_ref()).await,
            None => Err(SessionError::CheckpointNotFound(checkpoint_id.to_string())),
        }
    }

    /// Fan one runtime message out by kind.
    pub async fn dispatch(&self, message: &RuntimeMessage) {
        match message {
            RuntimeMessage::Assistant(assistant) => {
                for block in &assistant.message.content {
                    match block {
                        ContentBlock::Text { text } => self.ui.display_message(text).await,
                        ContentBlock::Thinking { content } => {
                            self.ui.display_thinking(content).await
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            self.tool_names
                                .lock()
                                .unwrap()
                                .insert(id.clone(), name.clone());
                            self.ui.display_tool_use(name, id, input).await;
                        }
                        // Tool results never appear in assistant content.
                        ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => {}
                    }
                }
            }
            RuntimeMessage::User(user) => {
                if let tiller_model::MessageContent::Blocks(blocks) = &user.message.content {
                    for block in blocks {
                        if let ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } = block
                        {
                            let name = self
                                .tool_names
                                .lock()
                                .unwrap()
                                .get(tool_use_id)
                                .cloned()
                                .unwrap_or_else(|| "tool".to_string());
                            let text = block_content_text(content);
                            self.ui.display_tool_result(&name, &text, *is_error).await;
                        }
                    }
                }

                // A user echo with a fresh uuid and no tool results marks a
                // new turn boundary: snapshot before any of its tool uses.
                if let (true, Some(uuid)) = (user.is_local_turn_echo(), user.uuid.as_deref()) {
                    let description = checkpoint_description(&user.message.content.text());
                    let mut guard = self.recorder.lock().await;
                    if let Some(recorder) = guard.as_mut() {
                        if let Err(e) =
                            recorder.capture(uuid, &description, user.session_id.as_deref())
                        {
                            warn!(checkpoint = uuid, error = %e, "checkpoint capture failed");
                        }
                    }
                }
            }
            RuntimeMessage::Result(_) => self.ui.stop_computing().await,
            RuntimeMessage::System(_) => {}
        }
    }
}

fn block_content_text(content: &BlockContent) -> String {
    match content {
        BlockContent::Text(text) => text.clone(),
        BlockContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingUi, UiEvent};
    use serde_json::json;
    use tiller_config::PermissionConfig;
    use tiller_model::{
        AssistantMessage, AssistantPayload, MessageContent, ResultUsage, UserMessage, UserPayload,
    };
    use tiller_permission::mock::StaticPermissionUi;

    fn router(ui: Arc<RecordingUi>) -> MessageRouter {
        let arbiter = Arc::new(PermissionArbiter::new(
            PermissionConfig::default(),
            Arc::new(StaticPermissionUi::approving()),
        ));
        MessageRouter::new(ui, arbiter)
    }

    fn assistant_blocks(blocks: Vec<ContentBlock>) -> RuntimeMessage {
        RuntimeMessage::Assistant(AssistantMessage {
            session_id: Some("S".into()),
            message: AssistantPayload { content: blocks },
        })
    }

    #[tokio::test]
    async fn assistant_blocks_fan_out_in_order() {
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui.clone());
        r.dispatch(&assistant_blocks(vec![
            ContentBlock::Thinking {
                content: "mull".into(),
            },
            ContentBlock::text("Hi there"),
            ContentBlock::ToolUse {
                id: "T1".into(),
                name: "Read".into(),
                input: json!({ "path": "x" }),
            },
        ]))
        .await;

        assert_eq!(
            ui.events(),
            vec![
                UiEvent::Thinking("mull".into()),
                UiEvent::Message("Hi there".into()),
                UiEvent::ToolUse {
                    name: "Read".into(),
                    tool_use_id: "T1".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn tool_results_are_labelled_from_the_tool_use_map() {
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui.clone());
        r.dispatch(&assistant_blocks(vec![ContentBlock::ToolUse {
            id: "T1".into(),
            name: "Grep".into(),
            input: json!({}),
        }]))
        .await;

        r.dispatch(&RuntimeMessage::User(UserMessage {
            session_id: Some("S".into()),
            uuid: Some("u-1".into()),
            message: UserPayload {
                role: tiller_model::Role::User,
                content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "T1".into(),
                    content: BlockContent::Text("3 matches".into()),
                    is_error: false,
                }]),
            },
        }))
        .await;

        assert!(ui.events().contains(&UiEvent::ToolResult {
            tool_name: "Grep".into(),
            is_error: false
        }));
    }

    #[tokio::test]
    async fn user_echo_captures_a_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui);
        r.attach_recorder(CheckpointRecorder::open(tmp.path())).await;

        let echo = RuntimeMessage::user_echo("S1", MessageContent::Text("fix the bug".into()));
        r.dispatch(&echo).await;

        let checkpoints = r.list_checkpoints().await;
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].description, "fix the bug");
        assert_eq!(checkpoints[0].runtime_session_id.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn tool_result_echo_does_not_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui);
        r.attach_recorder(CheckpointRecorder::open(tmp.path())).await;

        r.dispatch(&RuntimeMessage::User(UserMessage {
            session_id: Some("S".into()),
            uuid: Some("u-2".into()),
            message: UserPayload {
                role: tiller_model::Role::User,
                content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "T1".into(),
                    content: BlockContent::Text("ok".into()),
                    is_error: false,
                }]),
            },
        }))
        .await;

        assert!(r.list_checkpoints().await.is_empty());
    }

    #[tokio::test]
    async fn result_messages_stop_the_spinner() {
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui.clone());
        r.dispatch(&RuntimeMessage::result_success(
            "S",
            "done",
            0.0,
            1,
            ResultUsage::default(),
        ))
        .await;
        // stop_computing is a no-op on the recorder, but the dispatch path
        // must not touch any other sink.
        assert!(ui.events().is_empty());
    }

    #[tokio::test]
    async fn set_permission_mode_notifies_the_front_end() {
        let ui = Arc::new(RecordingUi::default());
        let r = router(ui.clone());
        r.set_permission_mode(PermissionMode::Plan).await.unwrap();
        assert_eq!(
            ui.events(),
            vec![UiEvent::PermissionMode(PermissionMode::Plan)]
        );
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic mock runtime for tests.
//!
//! A [`ScriptedRuntime`] consumes the prompt stream like the real runtime:
//! it emits `system.init`, echoes every user turn back with a fresh uuid
//! (so checkpoint triggering is exercised), then plays the next script.
//! Scripts can emit arbitrary runtime messages, invoke the permission gate,
//! or stall until cancelled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use tiller_config::PermissionMode;

use crate::{
    AgentRuntime, MessageContent, PermissionDecision, Prompt, Query, QueryOptions, ResultUsage,
    RuntimeHandle, RuntimeMessage, ToolGate, ToolUseContext,
};

/// One step of a scripted turn.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit this message on the runtime stream.
    Emit(RuntimeMessage),
    /// Invoke the permission gate as the runtime would for a tool use.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Suspend until the query is cancelled.
    Stall,
}

/// Records mode switches and rewinds; rejects rewinds for unknown ids the
/// way the real runtime does.
#[derive(Default)]
pub struct RecordingHandle {
    pub modes: Mutex<Vec<PermissionMode>>,
    pub rewinds: Mutex<Vec<String>>,
    known_checkpoints: Mutex<HashSet<String>>,
    fail_mode_change: AtomicBool,
}

impl RecordingHandle {
    /// Register a checkpoint id so `rewind_files` succeeds for it.
    pub fn allow_checkpoint(&self, id: impl Into<String>) {
        self.known_checkpoints.lock().unwrap().insert(id.into());
    }

    /// Make every subsequent `set_permission_mode` call fail.
    pub fn fail_mode_changes(&self) {
        self.fail_mode_change.store(true, Ordering::SeqCst);
    }

    pub fn last_mode(&self) -> Option<PermissionMode> {
        self.modes.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl RuntimeHandle for RecordingHandle {
    async fn set_permission_mode(&self, mode: PermissionMode) -> anyhow::Result<()> {
        if self.fail_mode_change.load(Ordering::SeqCst) {
            anyhow::bail!("mode change rejected");
        }
        self.modes.lock().unwrap().push(mode);
        Ok(())
    }

    async fn rewind_files(&self, checkpoint_id: &str) -> anyhow::Result<()> {
        if !self
            .known_checkpoints
            .lock()
            .unwrap()
            .contains(checkpoint_id)
        {
            anyhow::bail!("no checkpoint found: {checkpoint_id}");
        }
        self.rewinds.lock().unwrap().push(checkpoint_id.to_string());
        Ok(())
    }
}

/// A pre-scripted runtime.  Each consumed user turn pops the next script
/// from the front of the queue; when all scripts are spent, further turns
/// complete with an empty success result.
pub struct ScriptedRuntime {
    scripts: Arc<Mutex<Vec<Vec<ScriptStep>>>>,
    session_id: String,
    /// The `QueryOptions` of the most recent `query` call.
    pub last_options: Arc<Mutex<Option<QueryOptions>>>,
    /// Every decision the gate returned, in callback order.
    pub decisions: Arc<Mutex<Vec<PermissionDecision>>>,
    pub handle: Arc<RecordingHandle>,
    echo_user_turns: bool,
}

impl ScriptedRuntime {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            session_id: "mock-session".to_string(),
            last_options: Arc::new(Mutex::new(None)),
            decisions: Arc::new(Mutex::new(Vec::new())),
            handle: Arc::new(RecordingHandle::default()),
            echo_user_turns: true,
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    /// Suppress the user-turn echoes (for tests that only care about
    /// assistant output).
    pub fn without_user_echo(mut self) -> Self {
        self.echo_user_turns = false;
        self
    }

    /// Convenience: a turn that streams one assistant text and succeeds.
    pub fn text_turn(session_id: &str, text: &str) -> Vec<ScriptStep> {
        vec![
            ScriptStep::Emit(RuntimeMessage::assistant_text(session_id, text)),
            ScriptStep::Emit(RuntimeMessage::result_success(
                session_id,
                text,
                0.001,
                50,
                ResultUsage {
                    input_tokens: 10,
                    output_tokens: 3,
                },
            )),
        ]
    }

    /// Convenience: a turn that streams partial text and then hangs until
    /// cancelled.
    pub fn stalled_turn(session_id: &str, partial: &str) -> Vec<ScriptStep> {
        vec![
            ScriptStep::Emit(RuntimeMessage::assistant_text(session_id, partial)),
            ScriptStep::Stall,
        ]
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn query(
        &self,
        prompt: Prompt,
        options: QueryOptions,
        gate: Arc<dyn ToolGate>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Query> {
        *self.last_options.lock().unwrap() = Some(options);

        let (tx, rx) = tokio::sync::mpsc::channel::<anyhow::Result<RuntimeMessage>>(32);
        let scripts = Arc::clone(&self.scripts);
        let decisions = Arc::clone(&self.decisions);
        let session_id = self.session_id.clone();
        let echo = self.echo_user_turns;

        tokio::spawn(async move {
            let _ = tx
                .send(Ok(RuntimeMessage::system_init(session_id.clone())))
                .await;

            let mut turns: Box<dyn futures::Stream<Item = MessageContent> + Send + Unpin> =
                match prompt {
                    Prompt::Text(text) => {
                        Box::new(futures::stream::iter(vec![MessageContent::Text(text)]))
                    }
                    Prompt::Stream(s) => Box::new(s.map(|m| m.message.content)),
                };

            loop {
                let content = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = turns.next() => match next {
                        Some(c) => c,
                        None => break,
                    },
                };

                if echo {
                    let msg = RuntimeMessage::user_echo(session_id.clone(), content.clone());
                    if tx.send(Ok(msg)).await.is_err() {
                        return;
                    }
                }

                let script = {
                    let mut scripts = scripts.lock().unwrap();
                    if scripts.is_empty() {
                        vec![ScriptStep::Emit(RuntimeMessage::result_success(
                            session_id.clone(),
                            "",
                            0.0,
                            1,
                            ResultUsage::default(),
                        ))]
                    } else {
                        scripts.remove(0)
                    }
                };

                for step in script {
                    match step {
                        ScriptStep::Emit(msg) => {
                            if tx.send(Ok(msg)).await.is_err() {
                                return;
                            }
                        }
                        ScriptStep::ToolUse { id, name, input } => {
                            let ctx = ToolUseContext {
                                tool_use_id: id,
                                cancel: cancel.clone(),
                            };
                            match gate.can_use_tool(&name, input, ctx).await {
                                Ok(decision) => {
                                    decisions.lock().unwrap().push(decision);
                                }
                                Err(e) => {
                                    // A failed UI prompt aborts the turn and
                                    // surfaces as a runtime error result.
                                    let msg = RuntimeMessage::result_error(
                                        "error_during_execution",
                                        vec![e.to_string()],
                                    );
                                    let _ = tx.send(Ok(msg)).await;
                                }
                            }
                        }
                        ScriptStep::Stall => {
                            cancel.cancelled().await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(Query {
            stream: Box::pin(ReceiverStream::new(rx)),
            handle: Arc::clone(&self.handle) as Arc<dyn RuntimeHandle>,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

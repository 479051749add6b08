// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tiller_config::{
    env, AgentDefinition, HookEvent, McpServerConfig, PermissionConfig, PermissionMode,
    ResolvedConfig,
};
use tiller_input::{build_query_options, build_stream_message, ImageRefError, QueryInputs};
use tiller_model::{
    AgentRuntime, ContentBlock, HookRegistration, Message, MessageContent, OutboundUserMessage,
    Prompt, Query, ResultUsage, Role, RuntimeHandle, RuntimeMessage, RuntimeStream, StreamMessage,
    ToolGate, UsageStats,
};
use tiller_permission::{PermissionArbiter, PermissionUi};
use tiller_session::{CheckpointMeta, CheckpointRecorder, Session, SessionError, SessionStore};

use crate::classifier::{self, ErrorKind};
use crate::feed::LiveMessageFeed;
use crate::router::MessageRouter;
use crate::ui::InteractiveUi;

/// Prepended to raw user text while plan mode is active, before image
/// reference parsing.
pub const PLAN_MODE_PREFIX: &str = "[SYSTEM: You are in Plan Mode. Explore and plan only; do \
     not edit files or run commands until plan mode ends.]";

/// Lifecycle of the active streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Processing,
    Interrupted,
}

/// The terminal outcome of a streaming call, as captured by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnResult {
    pub is_error: bool,
    /// Assistant text: the runtime's terminal result on success, or
    /// whatever had accumulated when an error or interrupt cut the turn off.
    pub response: String,
    pub error_message: Option<String>,
    pub session_id: Option<String>,
    pub usage: Option<ResultUsage>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub image_errors: Vec<ImageRefError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptOutcome {
    pub success: bool,
    pub cleared_messages: usize,
}

struct ActiveSession {
    session: Session,
    feed: Arc<LiveMessageFeed>,
    cancel: CancellationToken,
    status: SessionStatus,
    inflight: bool,
    /// Bumped on every execution spawn so a stale execution's cleanup
    /// cannot clobber the state of its successor.
    generation: u64,
    last_result: Option<TurnResult>,
    exec: Option<JoinHandle<()>>,
    /// Shared with the outbound message adapter so every queued turn is
    /// stamped with the latest runtime session id.
    sdk_session_id: Arc<Mutex<Option<String>>>,
    handle: Option<Arc<dyn RuntimeHandle>>,
}

/// Owns one streaming session at a time and drives the runtime's
/// multi-turn loop: builds per-turn options, feeds the live input stream,
/// dispatches runtime messages, and arbitrates interruption.
pub struct TurnEngine {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<SessionStore>,
    ui: Arc<dyn InteractiveUi>,
    arbiter: Arc<PermissionArbiter>,
    router: Arc<MessageRouter>,
    /// Resolved once at construction; the environment is not re-read per turn.
    default_model: String,
    hooks: HashMap<HookEvent, Vec<HookRegistration>>,
    mcp_servers: HashMap<String, McpServerConfig>,
    state: Arc<Mutex<Option<ActiveSession>>>,
}

impl TurnEngine {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        store: Arc<SessionStore>,
        ui: Arc<dyn InteractiveUi>,
        permission_ui: Arc<dyn PermissionUi>,
        permission_config: PermissionConfig,
    ) -> Self {
        let arbiter = Arc::new(PermissionArbiter::new(permission_config, permission_ui));
        let router = Arc::new(MessageRouter::new(Arc::clone(&ui), Arc::clone(&arbiter)));
        Self {
            runtime,
            store,
            ui,
            arbiter,
            router,
            default_model: env::default_model(),
            hooks: HashMap::new(),
            mcp_servers: HashMap::new(),
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Hooks forwarded to the runtime with every execution.
    pub fn with_hooks(mut self, hooks: HashMap<HookEvent, Vec<HookRegistration>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Manager-owned MCP servers, overriding config entries on collision.
    pub fn with_mcp_servers(mut self, servers: HashMap<String, McpServerConfig>) -> Self {
        self.mcp_servers = servers;
        self
    }

    pub fn arbiter(&self) -> &Arc<PermissionArbiter> {
        &self.arbiter
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.state.lock().unwrap().as_ref().map(|a| a.status)
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.session.id.clone())
    }

    /// Make `session` the active streaming session, ending any prior one
    /// first (which drains its queue with a warning on loss).
    pub async fn start_session(&self, session: Session) {
        self.end_session().await;

        let recorder = CheckpointRecorder::open(&self.store.session_dir(&session.id));
        self.router.attach_recorder(recorder).await;
        self.ui
            .set_initial_permission_mode(self.arbiter.mode())
            .await;

        let sdk_session_id = Arc::new(Mutex::new(session.sdk_session_id.clone()));
        *self.state.lock().unwrap() = Some(ActiveSession {
            session,
            feed: Arc::new(LiveMessageFeed::new()),
            cancel: CancellationToken::new(),
            status: SessionStatus::Idle,
            inflight: false,
            generation: 0,
            last_result: None,
            exec: None,
            sdk_session_id,
            handle: None,
        });
    }

    /// Tear down the active session: drain and stop the feed, cancel any
    /// in-flight execution, and drop all per-session state.
    pub async fn end_session(&self) {
        let prior = self.state.lock().unwrap().take();
        if let Some(active) = prior {
            let cleared = active.feed.clear_queue();
            if cleared > 0 {
                warn!(cleared, "ending session with unsent messages in the queue");
            }
            active.feed.stop();
            if active.status == SessionStatus::Processing {
                active.cancel.cancel();
            }
            self.router.detach_recorder().await;
        }
    }

    /// Expand `raw` into a user turn and queue it for the runtime, starting
    /// an execution if none is running.  Image reference failures are
    /// reported but only fail the send when nothing sendable remains.
    pub async fn send_message(&self, raw: &str) -> SendOutcome {
        let no_session = SendOutcome {
            success: false,
            error: Some("No active streaming session".to_string()),
            image_errors: Vec::new(),
        };

        let (cwd, plan_mode) = {
            let state = self.state.lock().unwrap();
            let Some(active) = state.as_ref() else {
                return no_session;
            };
            (
                active.session.working_directory.clone(),
                self.arbiter.mode() == PermissionMode::Plan,
            )
        };

        let text = if plan_mode {
            format!("{PLAN_MODE_PREFIX}\n\n{raw}")
        } else {
            raw.to_string()
        };
        let built = build_stream_message(&text, &cwd);
        if built.content_blocks.is_empty() {
            return SendOutcome {
                success: false,
                error: Some("message had no sendable content".to_string()),
                image_errors: built.errors,
            };
        }
        let content = MessageContent::Blocks(built.content_blocks);

        let spawn_ctx = {
            let mut state = self.state.lock().unwrap();
            let Some(active) = state.as_mut() else {
                return no_session;
            };
            active
                .session
                .add_message(Role::User, content.clone());
            if let Err(e) = self.store.save_session(&mut active.session) {
                warn!(error = %e, "could not persist user turn");
            }
            active.feed.push(StreamMessage::user(content));
            active.status = SessionStatus::Processing;
            if active.inflight {
                None
            } else {
                active.inflight = true;
                active.generation += 1;
                active.feed.reset();
                Some(self.execution_context(active))
            }
        };

        if let Some(ctx) = spawn_ctx {
            let handle = tokio::spawn(run_execution(ctx));
            if let Some(active) = self.state.lock().unwrap().as_mut() {
                active.exec = Some(handle);
            }
        }

        self.ui.set_processing_state(true).await;
        SendOutcome {
            success: true,
            error: None,
            image_errors: built.errors,
        }
    }

    /// [`send_message`] with the outcome discarded; callable mid-turn.
    pub async fn queue_message(&self, raw: &str) {
        let _ = self.send_message(raw).await;
    }

    /// Cancel the in-flight execution and drain the queue.  A fresh
    /// cancellation token is installed so the next send starts clean.
    pub fn interrupt_session(&self) -> InterruptOutcome {
        let mut state = self.state.lock().unwrap();
        let Some(active) = state.as_mut() else {
            return InterruptOutcome::default();
        };
        if active.status != SessionStatus::Processing {
            return InterruptOutcome::default();
        }
        active.cancel.cancel();
        let cleared_messages = active.feed.clear_queue();
        active.status = SessionStatus::Interrupted;
        active.cancel = CancellationToken::new();
        active.inflight = false;
        debug!(cleared_messages, "session interrupted");
        InterruptOutcome {
            success: true,
            cleared_messages,
        }
    }

    /// Switch the permission mode for subsequent tool arbitration.  The
    /// router pushes the change through the arbiter to the runtime handle
    /// and notifies the front end.
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> anyhow::Result<()> {
        self.router.set_permission_mode(mode).await
    }

    /// Await the in-flight execution (if any) and return the last captured
    /// result.
    pub async fn wait_for_result(&self) -> Option<TurnResult> {
        let exec = {
            let mut state = self.state.lock().unwrap();
            state.as_mut().and_then(|a| a.exec.take())
        };
        if let Some(handle) = exec {
            let _ = handle.await;
        }
        self.state
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|a| a.last_result.clone())
    }

    pub async fn list_checkpoints(&self) -> Vec<CheckpointMeta> {
        self.router.list_checkpoints().await
    }

    /// Rewind files to the snapshot taken for `checkpoint_id`.
    pub async fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<(), SessionError> {
        let handle = self
            .state
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|a| a.handle.clone())
            .ok_or_else(|| SessionError::Rewind("no runtime handle available".to_string()))?;
        self.router.restore_checkpoint(checkpoint_id, handle).await
    }

    fn execution_context(&self, active: &ActiveSession) -> ExecContext {
        let active_agents: HashMap<String, AgentDefinition> = active
            .session
            .context
            .active_agents
            .iter()
            .map(|a| (a.name.clone(), a.agent.clone()))
            .collect();
        ExecContext {
            runtime: Arc::clone(&self.runtime),
            store: Arc::clone(&self.store),
            ui: Arc::clone(&self.ui),
            arbiter: Arc::clone(&self.arbiter),
            router: Arc::clone(&self.router),
            state: Arc::clone(&self.state),
            feed: Arc::clone(&active.feed),
            cancel: active.cancel.clone(),
            sdk_session_id: Arc::clone(&active.sdk_session_id),
            generation: active.generation,
            cwd: active.session.working_directory.clone(),
            config: active.session.context.resolved_config.clone(),
            mode: self.arbiter.mode(),
            active_agents,
            mcp_servers: self.mcp_servers.clone(),
            hooks: self.hooks.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

struct ExecContext {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<SessionStore>,
    ui: Arc<dyn InteractiveUi>,
    arbiter: Arc<PermissionArbiter>,
    router: Arc<MessageRouter>,
    state: Arc<Mutex<Option<ActiveSession>>>,
    feed: Arc<LiveMessageFeed>,
    cancel: CancellationToken,
    sdk_session_id: Arc<Mutex<Option<String>>>,
    generation: u64,
    cwd: std::path::PathBuf,
    config: ResolvedConfig,
    mode: PermissionMode,
    active_agents: HashMap<String, AgentDefinition>,
    mcp_servers: HashMap<String, McpServerConfig>,
    hooks: HashMap<HookEvent, Vec<HookRegistration>>,
    default_model: String,
}

/// One streaming call against the runtime, covering every turn sent until
/// the feed ends or the call is cancelled.
async fn run_execution(ctx: ExecContext) {
    let options = build_query_options(QueryInputs {
        cwd: &ctx.cwd,
        config: &ctx.config,
        mode: ctx.mode,
        active_agents: &ctx.active_agents,
        custom_mcp_servers: &ctx.mcp_servers,
        hooks: ctx.hooks.clone(),
        default_model: &ctx.default_model,
    });

    let sdk_for_adapter = Arc::clone(&ctx.sdk_session_id);
    let prompt = Prompt::Stream(Box::pin(Arc::clone(&ctx.feed).stream().map(move |m| {
        let session_id = sdk_for_adapter.lock().unwrap().clone();
        OutboundUserMessage::adapt(m, session_id)
    })));

    let gate: Arc<dyn ToolGate> = ctx.arbiter.clone();
    let result = match ctx
        .runtime
        .query(prompt, options, gate, ctx.cancel.clone())
        .await
    {
        Err(e) => {
            let kind = classifier::classify("", &e.to_string());
            let text = classifier::user_message(kind);
            warn!(error = %e, "runtime query failed to start");
            ctx.ui.display_error(text).await;
            TurnResult {
                is_error: true,
                error_message: Some(text.to_string()),
                ..Default::default()
            }
        }
        Ok(Query { stream, handle }) => {
            ctx.arbiter.register_handle(Arc::clone(&handle));
            if let Some(active) = ctx.state.lock().unwrap().as_mut() {
                active.handle = Some(Arc::clone(&handle));
            }
            consume_stream(stream, &ctx).await
        }
    };

    // Cleanup, guarded by generation so a stale execution that lost a race
    // with interrupt + resend cannot clobber its successor's state.
    {
        let mut state = ctx.state.lock().unwrap();
        if let Some(active) = state.as_mut() {
            if active.generation == ctx.generation {
                active.inflight = false;
                if active.status == SessionStatus::Processing {
                    active.status = SessionStatus::Idle;
                }
                let stray = active.feed.pending_count();
                if stray > 0 {
                    active.feed.clear_queue();
                    warn!(stray, "execution ended with messages still queued");
                }
                active.last_result = Some(result);
            }
        }
    }
    ctx.ui.set_processing_state(false).await;
}

async fn consume_stream(mut stream: RuntimeStream, ctx: &ExecContext) -> TurnResult {
    let mut accumulated = String::new();
    let mut current_sid: Option<String> = None;
    let mut last_success: Option<TurnResult> = None;
    let mut last_error: Option<TurnResult> = None;

    loop {
        // Poll the token before each dispatch so a stuck runtime still
        // yields an interrupted result on the next message.
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                return interrupted_result(accumulated, current_sid);
            }
            item = stream.next() => item,
        };
        let Some(item) = item else { break };

        let message = match item {
            Ok(message) => message,
            Err(e) => {
                let kind = classifier::classify("", &e.to_string());
                let text = classifier::user_message(kind);
                ctx.ui.display_error(text).await;
                last_error = Some(TurnResult {
                    is_error: true,
                    response: accumulated.clone(),
                    error_message: Some(text.to_string()),
                    session_id: current_sid.clone(),
                    ..Default::default()
                });
                break;
            }
        };

        if let Some(sid) = message.session_id() {
            current_sid = Some(sid.to_string());
            *ctx.sdk_session_id.lock().unwrap() = Some(sid.to_string());
        }

        ctx.router.dispatch(&message).await;

        match &message {
            RuntimeMessage::System(system) if system.subtype == "init" => {
                let mut state = ctx.state.lock().unwrap();
                if let Some(active) = state.as_mut() {
                    active.session.sdk_session_id = system.session_id.clone();
                    if let Err(e) = ctx.store.save_session(&mut active.session) {
                        warn!(error = %e, "could not persist session after init");
                    }
                }
            }
            RuntimeMessage::Assistant(assistant) => {
                for block in &assistant.message.content {
                    if let ContentBlock::Text { text } = block {
                        accumulated.push_str(text);
                    }
                }
            }
            RuntimeMessage::Result(result) if result.is_success() => {
                let turn = TurnResult {
                    is_error: false,
                    response: result
                        .result
                        .clone()
                        .unwrap_or_else(|| accumulated.clone()),
                    error_message: None,
                    session_id: result.session_id.clone().or_else(|| current_sid.clone()),
                    usage: result.usage,
                    cost_usd: result.total_cost_usd,
                    duration_ms: result.duration_ms,
                };
                persist_assistant_turn(ctx, &turn);
                last_success = Some(turn);
                accumulated.clear();
                // Burst complete: nothing further is queued, so the call
                // has no more turns to run.  A later send starts a fresh
                // execution.
                if ctx.feed.pending_count() == 0 {
                    break;
                }
            }
            RuntimeMessage::Result(result) => {
                let joined = result.errors.join("; ");
                let kind = classifier::classify(&result.subtype, &joined);
                let text = classifier::user_message(kind);
                ctx.ui.display_error(text).await;
                last_error = Some(TurnResult {
                    is_error: true,
                    response: accumulated.clone(),
                    error_message: Some(text.to_string()),
                    session_id: result.session_id.clone().or_else(|| current_sid.clone()),
                    usage: result.usage,
                    cost_usd: result.total_cost_usd,
                    duration_ms: result.duration_ms,
                });
                accumulated.clear();
                if ctx.feed.pending_count() == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    last_error.or(last_success).unwrap_or(TurnResult {
        is_error: false,
        response: accumulated,
        session_id: current_sid,
        ..Default::default()
    })
}

/// Append the terminal assistant text to the session log with its usage
/// totals and persist.
fn persist_assistant_turn(ctx: &ExecContext, turn: &TurnResult) {
    let mut state = ctx.state.lock().unwrap();
    let Some(active) = state.as_mut() else { return };
    let mut message = Message::assistant(turn.response.clone());
    message.usage = Some(UsageStats {
        input_tokens: turn.usage.map(|u| u.input_tokens).unwrap_or(0),
        output_tokens: turn.usage.map(|u| u.output_tokens).unwrap_or(0),
        cost_usd: turn.cost_usd.unwrap_or(0.0),
        duration_ms: turn.duration_ms.unwrap_or(0),
    });
    active.session.messages.push(message);
    if let Err(e) = ctx.store.save_session(&mut active.session) {
        warn!(error = %e, "could not persist assistant turn");
    }
}

fn interrupted_result(response: String, session_id: Option<String>) -> TurnResult {
    TurnResult {
        is_error: true,
        response,
        error_message: Some(classifier::user_message(ErrorKind::Interrupted).to_string()),
        session_id,
        ..Default::default()
    }
}

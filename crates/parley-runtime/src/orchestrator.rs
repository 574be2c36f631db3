//! Per-connection conversation orchestrator.
//!
//! Owns the turn cycle for one participant connection: persist the user
//! message, stream the partner response, stream the coach response, log
//! usage, re-derive quota. Aside questions run through the same machinery
//! on a secondary coach-only thread, guarded by the shared [`TurnSlot`] so
//! a main turn and an aside can never overlap.
//!
//! The orchestrator is transport-agnostic: frames leave through two
//! [`FrameSink`]s (the owning participant socket and the session's observer
//! fan-out) and all persistence goes through [`ConversationStore`]. Handlers
//! are safe to invoke concurrently — the slot is claimed under a sync lock
//! before the first await, so racing frames resolve deterministically.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use parley_core::errors::ErrorCode;
use parley_core::message::{MessageId, MessageMetadata, MessageRole, NewMessage, StoredMessage};
use parley_core::protocol::ServerMessage;
use parley_core::quota::QuotaStatus;
use parley_core::retry::RetryPlan;
use parley_core::session::{RolePrompt, SessionRecord};
use parley_core::usage::{NewUsageRecord, StreamKind, TokenUsage};
use parley_llm::models::ModelCatalog;
use parley_llm::provider::{ChatMessage, CompletionRequest, ProviderFactory};
use parley_llm::retry::{stream_with_failover, FailoverConfig, StreamFactory};
use parley_store::{ConversationStore, StoreError};

use crate::context::{aside_context, aside_system_prompt, coach_context, partner_context};
use crate::sink::FrameSink;
use crate::state::TurnSlot;
use crate::stream_driver::{drive, StreamEnd, StreamOutcome};

/// Default response token cap passed to provider calls.
pub const DEFAULT_MAX_RESPONSE_TOKENS: u32 = 1024;

/// Tunables shared by every orchestrator in a process.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Retry budget and pacing for provider calls.
    pub retry: RetryPlan,
    /// Model capability catalog (web search, fallback).
    pub catalog: ModelCatalog,
    /// Response token cap, passed through to providers.
    pub max_response_tokens: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPlan::default(),
            catalog: ModelCatalog::default(),
            max_response_tokens: Some(DEFAULT_MAX_RESPONSE_TOKENS),
        }
    }
}

/// Drives one participant connection's conversation.
pub struct Orchestrator {
    session: SessionRecord,
    store: Arc<dyn ConversationStore>,
    providers: Arc<dyn ProviderFactory>,
    client: Arc<dyn FrameSink>,
    observers: Arc<dyn FrameSink>,
    config: OrchestratorConfig,
    slot: TurnSlot,
    // In-memory mirror of persisted history, used for context assembly.
    history: Mutex<Vec<StoredMessage>>,
}

impl Orchestrator {
    /// Build an orchestrator for a loaded session.
    #[must_use]
    pub fn new(
        session: SessionRecord,
        store: Arc<dyn ConversationStore>,
        providers: Arc<dyn ProviderFactory>,
        client: Arc<dyn FrameSink>,
        observers: Arc<dyn FrameSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let history = Mutex::new(session.messages.clone());
        Self {
            session,
            store,
            providers,
            client,
            observers,
            config,
            slot: TurnSlot::new(),
            history,
        }
    }

    /// The bound session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Send the connection handshake: `connected` plus the full history.
    pub async fn initialize(&self) {
        self.client
            .send(ServerMessage::Connected {
                session_id: self.session.id.clone(),
                scenario: self.session.prompts.summary(),
            })
            .await;
        let messages = self.history.lock().clone();
        self.client.send(ServerMessage::History { messages }).await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Main turn cycle
    // ─────────────────────────────────────────────────────────────────────

    /// Handle a main-thread user turn.
    ///
    /// Claims the turn slot synchronously, gates on quota, then runs the
    /// full cycle. Rejections and failures are reported on the owning
    /// socket; the slot is always released on exit.
    #[instrument(skip_all, fields(session_id = %self.session.id))]
    pub async fn handle_user_message(&self, content: String) {
        if let Err(code) = self.slot.begin_main() {
            self.client
                .send(ServerMessage::error(code, "another turn is already in progress"))
                .await;
            return;
        }

        match self.quota_snapshot().await {
            Ok(Some(status)) if status.is_exhausted() => {
                debug!("quota exhausted, rejecting turn before persistence");
                self.client.send(ServerMessage::QuotaExhausted).await;
            }
            Ok(_) => self.run_main_cycle(content).await,
            Err(e) => {
                warn!(error = %e, "quota check failed");
                self.client
                    .send(ServerMessage::error(ErrorCode::Internal, "quota check failed"))
                    .await;
            }
        }

        self.slot.finish_main();
    }

    async fn run_main_cycle(&self, content: String) {
        let user_message = match self
            .persist(NewMessage::main(&self.session.id, MessageRole::User, content))
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to persist user message");
                self.client
                    .send(ServerMessage::error(ErrorCode::Internal, "failed to save message"))
                    .await;
                return;
            }
        };
        self.emit_all(ServerMessage::History {
            messages: vec![user_message],
        })
        .await;

        // Partner stream. Web search is offered; the failover layer drops
        // the flag for models that cannot use it.
        let partner = self.session.prompts.partner().clone();
        let context = partner_context(&self.history.lock().clone());
        let outcome = self
            .call_role(&partner, partner.system_prompt.clone(), context, true, None, |delta| {
                ServerMessage::PartnerDelta { delta }
            })
            .await;
        let Some(partner_usage) = self
            .settle_main_stream(outcome, MessageRole::Partner, |message_id, usage| {
                ServerMessage::PartnerDone { message_id, usage }
            })
            .await
        else {
            return;
        };

        // Coach stream, over the labeled transcript including the partner
        // turn that just landed.
        let coach = self.session.prompts.coach().clone();
        let context = coach_context(&self.history.lock().clone());
        let outcome = self
            .call_role(&coach, coach.system_prompt.clone(), context, false, None, |delta| {
                ServerMessage::CoachDelta { delta }
            })
            .await;
        let coach_usage = self
            .settle_main_stream(outcome, MessageRole::Coach, |message_id, usage| {
                ServerMessage::CoachDone { message_id, usage }
            })
            .await;

        self.log_usage(StreamKind::Partner, partner_usage).await;
        if let Some(usage) = coach_usage {
            self.log_usage(StreamKind::Coach, usage).await;
        }

        // Partner usage counts against the quota even when the cycle aborted
        // at the coach step, so threshold crossings are announced either way.
        self.emit_quota_signals().await;
    }

    /// Persist and announce one finished main-thread stream.
    ///
    /// On success returns the usage to log. On failure persists whatever
    /// partial content streamed (marked incomplete), reports a recoverable
    /// `PROVIDER_ERROR`, and returns `None` to abort the cycle.
    async fn settle_main_stream(
        &self,
        outcome: StreamOutcome,
        role: MessageRole,
        done_frame: impl Fn(MessageId, TokenUsage) -> ServerMessage,
    ) -> Option<TokenUsage> {
        match outcome.end {
            StreamEnd::Completed { usage } => {
                let message = NewMessage::main(&self.session.id, role, outcome.text);
                match self.persist(message).await {
                    Ok(stored) => {
                        self.emit_all(done_frame(stored.id, usage)).await;
                        Some(usage)
                    }
                    Err(e) => {
                        warn!(error = %e, ?role, "failed to persist completed response");
                        self.client
                            .send(ServerMessage::error(
                                ErrorCode::Internal,
                                "failed to save response",
                            ))
                            .await;
                        None
                    }
                }
            }
            StreamEnd::Cancelled => None,
            StreamEnd::Failed(ref e) => {
                warn!(error = %e, ?role, "provider stream failed");
                if outcome.has_text() {
                    let partial = NewMessage::main(&self.session.id, role, outcome.text)
                        .with_metadata(MessageMetadata::incomplete(e.to_string()));
                    if let Err(persist_err) = self.persist(partial).await {
                        warn!(error = %persist_err, "failed to persist partial response");
                    }
                }
                self.client
                    .send(ServerMessage::error(ErrorCode::ProviderError, e.to_string()))
                    .await;
                None
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Asides
    // ─────────────────────────────────────────────────────────────────────

    /// Handle an aside question on `thread_id`.
    #[instrument(skip_all, fields(session_id = %self.session.id, thread_id = %thread_id))]
    pub async fn handle_aside_start(&self, thread_id: String, content: String) {
        let cancel = match self.slot.begin_aside(&thread_id) {
            Ok(token) => token,
            Err(code) => {
                self.client
                    .send(ServerMessage::AsideError {
                        thread_id,
                        code,
                        message: "another turn is already in progress".into(),
                    })
                    .await;
                return;
            }
        };

        let question = NewMessage::aside(&self.session.id, MessageRole::User, content.clone(), &thread_id);
        match self.persist(question).await {
            Ok(stored) => {
                self.emit_all(ServerMessage::History {
                    messages: vec![stored],
                })
                .await;
            }
            Err(e) => {
                warn!(error = %e, "failed to persist aside question");
                self.client
                    .send(ServerMessage::AsideError {
                        thread_id: thread_id.clone(),
                        code: ErrorCode::Internal,
                        message: "failed to save question".into(),
                    })
                    .await;
                self.slot.finish_aside(&thread_id);
                return;
            }
        }

        // Asides never use web search regardless of the coach model.
        let coach = self.session.prompts.coach().clone();
        let context = aside_context(&self.history.lock().clone(), &content);
        let system_prompt = aside_system_prompt(&coach.system_prompt);
        let frame_thread = thread_id.clone();
        let outcome = self
            .call_role(&coach, system_prompt, context, false, Some(cancel), move |delta| {
                ServerMessage::AsideDelta {
                    thread_id: frame_thread.clone(),
                    delta,
                }
            })
            .await;

        match outcome.end {
            StreamEnd::Completed { usage } => {
                let answer =
                    NewMessage::aside(&self.session.id, MessageRole::Coach, outcome.text, &thread_id);
                match self.persist(answer).await {
                    Ok(stored) => {
                        self.emit_all(ServerMessage::AsideDone {
                            thread_id: thread_id.clone(),
                            message_id: stored.id,
                            usage,
                        })
                        .await;
                        self.log_usage(StreamKind::Aside, usage).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to persist aside answer");
                        self.client
                            .send(ServerMessage::AsideError {
                                thread_id: thread_id.clone(),
                                code: ErrorCode::Internal,
                                message: "failed to save answer".into(),
                            })
                            .await;
                    }
                }
            }
            StreamEnd::Cancelled => {
                debug!("aside cancelled");
                // Streamed content was already seen by the client; keep it,
                // marked incomplete. No terminal frame after a user cancel.
                if outcome.has_text() {
                    let partial =
                        NewMessage::aside(&self.session.id, MessageRole::Coach, outcome.text, &thread_id)
                            .with_metadata(MessageMetadata::incomplete("cancelled"));
                    if let Err(e) = self.persist(partial).await {
                        warn!(error = %e, "failed to persist cancelled aside content");
                    }
                }
            }
            StreamEnd::Failed(ref e) => {
                warn!(error = %e, "aside stream failed");
                if outcome.has_text() {
                    let partial =
                        NewMessage::aside(&self.session.id, MessageRole::Coach, outcome.text, &thread_id)
                            .with_metadata(MessageMetadata::incomplete(e.to_string()));
                    if let Err(persist_err) = self.persist(partial).await {
                        warn!(error = %persist_err, "failed to persist partial aside");
                    }
                }
                self.client
                    .send(ServerMessage::AsideError {
                        thread_id: thread_id.clone(),
                        code: ErrorCode::ProviderError,
                        message: e.to_string(),
                    })
                    .await;
            }
        }

        self.slot.finish_aside(&thread_id);
    }

    /// Cancel the active aside, if `thread_id` matches it.
    ///
    /// The slot is cleared immediately, so new work can start even while
    /// the cancelled stream is still winding down.
    pub async fn handle_aside_cancel(&self, thread_id: String) {
        if self.slot.cancel_aside(&thread_id).is_none() {
            debug!(%thread_id, "aside cancel for inactive thread, ignoring");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Resume
    // ─────────────────────────────────────────────────────────────────────

    /// Replay persisted messages after `after` (all, if `None`) to the
    /// owning socket. Replays from the store, not the in-memory mirror.
    pub async fn handle_resume(&self, after: Option<MessageId>) {
        match self.store.messages_after(&self.session.id, after).await {
            Ok(messages) => {
                self.client.send(ServerMessage::History { messages }).await;
            }
            Err(e) => {
                warn!(error = %e, "resume replay failed");
                self.client
                    .send(ServerMessage::error(ErrorCode::Internal, "failed to load history"))
                    .await;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Run one provider call through the failover wrapper, relaying deltas
    /// as frames built by `make_frame`.
    async fn call_role(
        &self,
        role: &RolePrompt,
        system_prompt: String,
        context: Vec<ChatMessage>,
        web_search: bool,
        cancel: Option<CancellationToken>,
        make_frame: impl Fn(String) -> ServerMessage + Send + Sync,
    ) -> StreamOutcome {
        let providers = Arc::clone(&self.providers);
        let max_tokens = self.config.max_response_tokens;
        let request_cancel = cancel.clone();
        let factory: StreamFactory = Box::new(move |model, web_search| {
            let providers = Arc::clone(&providers);
            let request = CompletionRequest {
                model,
                system_prompt: system_prompt.clone(),
                messages: context.clone(),
                max_tokens,
                web_search,
                cancel: request_cancel.clone(),
            };
            Box::pin(async move {
                let provider = providers.create_for_model(&request.model).await?;
                provider.stream(&request).await
            })
        });

        let stream = stream_with_failover(
            factory,
            FailoverConfig {
                model: role.model.clone(),
                web_search,
                retry: self.config.retry,
                catalog: self.config.catalog.clone(),
                cancel: cancel.clone(),
            },
        );

        drive(stream, cancel, |delta| self.emit_all(make_frame(delta))).await
    }

    /// Persist a message and mirror it into the in-memory history.
    async fn persist(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let stored = self.store.create_message(message).await?;
        self.history.lock().push(stored.clone());
        Ok(stored)
    }

    /// Deliver a frame to the owning socket, then the observer fan-out.
    async fn emit_all(&self, message: ServerMessage) {
        self.client.send(message.clone()).await;
        self.observers.send(message).await;
    }

    async fn log_usage(&self, stream: StreamKind, usage: TokenUsage) {
        let record = NewUsageRecord {
            session_id: self.session.id.clone(),
            user_id: self.session.user_id.clone(),
            invitation_id: self
                .session
                .invitation
                .as_ref()
                .map(|link| link.invitation_id.clone()),
            stream,
            usage,
        };
        if let Err(e) = self.store.log_usage(record).await {
            warn!(error = %e, "failed to log usage");
        }
    }

    /// Derived quota status, if the session carries an invitation.
    async fn quota_snapshot(&self) -> Result<Option<QuotaStatus>, StoreError> {
        match &self.session.invitation {
            Some(link) => {
                let status = self
                    .store
                    .quota_status(&link.invitation_id, link.quota)
                    .await?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Re-derive quota after logging usage and announce threshold crossings.
    async fn emit_quota_signals(&self) {
        match self.quota_snapshot().await {
            Ok(Some(status)) if status.is_exhausted() => {
                self.emit_all(ServerMessage::QuotaExhausted).await;
            }
            Ok(Some(status)) if status.is_warning() => {
                self.emit_all(ServerMessage::QuotaWarning {
                    remaining: status.remaining,
                    total: status.total,
                })
                .await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "post-turn quota check failed"),
        }
    }
}

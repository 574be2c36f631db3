//! End-to-end orchestrator tests over a scripted provider and an in-memory
//! store: the dual-stream turn cycle, contention rules, quota enforcement,
//! aside lifecycle, failure handling, and resume replay.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use parley_core::message::{MessageRole, NewMessage, Thread};
use parley_core::protocol::ServerMessage;
use parley_core::quota::QuotaDefinition;
use parley_core::retry::RetryPlan;
use parley_core::session::{InvitationLink, PromptConfig, RolePrompt, SessionRecord};
use parley_core::usage::{NewUsageRecord, StreamKind, TokenUsage};
use parley_llm::models::ModelCatalog;
use parley_llm::provider::{
    ChatMessage, CompletionRequest, CompletionStream, Provider, ProviderError, ProviderFactory,
    ProviderResult, StreamEvent,
};
use parley_runtime::{FrameSink, Orchestrator, OrchestratorConfig};
use parley_store::{ConversationStore, MemoryStore};

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<ServerMessage>>,
}

impl RecordingSink {
    fn frames(&self) -> Vec<ServerMessage> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&self, message: ServerMessage) {
        self.frames.lock().push(message);
    }
}

/// One scripted provider call.
enum ScriptedCall {
    /// Stream yields these items.
    Events(Vec<Result<StreamEvent, ProviderError>>),
    /// Provider creation fails.
    FailCreate(ProviderError),
    /// Stream waits for the notify before yielding.
    Gated(Vec<Result<StreamEvent, ProviderError>>, Arc<Notify>),
    /// Stream yields these items, then hangs forever.
    Hang(Vec<Result<StreamEvent, ProviderError>>),
}

#[derive(Clone)]
struct RecordedRequest {
    model: String,
    web_search: bool,
    system_prompt: String,
    messages: Vec<ChatMessage>,
}

/// Factory consuming scripts in order, recording every call.
#[derive(Default)]
struct ScriptedFactory {
    scripts: Mutex<VecDeque<ScriptedCall>>,
    models: Mutex<Vec<String>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedFactory {
    fn with_scripts(scripts: Vec<ScriptedCall>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    fn models(&self) -> Vec<String> {
        self.models.lock().clone()
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ProviderFactory for ScriptedFactory {
    async fn create_for_model(&self, model: &str) -> ProviderResult<Arc<dyn Provider>> {
        self.models.lock().push(model.to_owned());
        let script = self
            .scripts
            .lock()
            .pop_front()
            .expect("more provider calls than scripts");
        if let ScriptedCall::FailCreate(e) = script {
            return Err(e);
        }
        Ok(Arc::new(ScriptedProvider {
            model: model.to_owned(),
            script: Mutex::new(Some(script)),
            requests: Arc::clone(&self.requests),
        }))
    }
}

struct ScriptedProvider {
    model: String,
    script: Mutex<Option<ScriptedCall>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<CompletionStream> {
        self.requests.lock().push(RecordedRequest {
            model: request.model.clone(),
            web_search: request.web_search,
            system_prompt: request.system_prompt.clone(),
            messages: request.messages.clone(),
        });
        let script = self.script.lock().take().expect("stream called twice");
        Ok(match script {
            ScriptedCall::Events(items) => Box::pin(futures::stream::iter(items)),
            ScriptedCall::Gated(items, gate) => Box::pin(async_stream::stream! {
                gate.notified().await;
                for item in items {
                    yield item;
                }
            }),
            ScriptedCall::Hang(items) => Box::pin(async_stream::stream! {
                for item in items {
                    yield item;
                }
                futures::future::pending::<()>().await;
            }),
            ScriptedCall::FailCreate(_) => unreachable!("handled by the factory"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn delta(text: &str) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::Delta { text: text.into() })
}

fn done(input_tokens: u64, output_tokens: u64) -> Result<StreamEvent, ProviderError> {
    Ok(StreamEvent::Done {
        usage: TokenUsage {
            input_tokens,
            output_tokens,
        },
    })
}

fn quota_error() -> ProviderError {
    ProviderError::Api {
        status: 429,
        message: "quota exceeded".into(),
        code: Some("quota_exceeded".into()),
        retryable: true,
    }
}

fn session(partner_model: &str, invitation: Option<InvitationLink>) -> SessionRecord {
    SessionRecord {
        id: "sess_1".into(),
        user_id: "user_1".into(),
        prompts: PromptConfig::Custom {
            partner: RolePrompt {
                model: partner_model.into(),
                system_prompt: "You are the negotiation partner.".into(),
            },
            coach: RolePrompt {
                model: "coach-model".into(),
                system_prompt: "You coach the candidate.".into(),
            },
        },
        invitation,
        messages: Vec::new(),
    }
}

fn invitation(total_tokens: u64) -> InvitationLink {
    InvitationLink {
        invitation_id: "inv_1".into(),
        quota: QuotaDefinition { total_tokens },
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryStore>,
    factory: Arc<ScriptedFactory>,
    client: Arc<RecordingSink>,
    observers: Arc<RecordingSink>,
}

async fn harness(record: SessionRecord, scripts: Vec<ScriptedCall>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.insert_session(record.clone());
    let loaded = store.load_session(&record.id).await.unwrap();

    let factory = ScriptedFactory::with_scripts(scripts);
    let client = Arc::new(RecordingSink::default());
    let observers = Arc::new(RecordingSink::default());

    let config = OrchestratorConfig {
        retry: RetryPlan {
            max_retries: 2,
            base_delay_ms: 1,
        },
        catalog: ModelCatalog::default(),
        max_response_tokens: Some(256),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        loaded,
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::clone(&factory) as Arc<dyn ProviderFactory>,
        Arc::clone(&client) as Arc<dyn FrameSink>,
        Arc::clone(&observers) as Arc<dyn FrameSink>,
        config,
    ));

    Harness {
        orchestrator,
        store,
        factory,
        client,
        observers,
    }
}

fn frame_types(frames: &[ServerMessage]) -> Vec<&'static str> {
    frames
        .iter()
        .map(|f| match f {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::History { .. } => "history",
            ServerMessage::PartnerDelta { .. } => "partner:delta",
            ServerMessage::PartnerDone { .. } => "partner:done",
            ServerMessage::CoachDelta { .. } => "coach:delta",
            ServerMessage::CoachDone { .. } => "coach:done",
            ServerMessage::AsideDelta { .. } => "aside:delta",
            ServerMessage::AsideDone { .. } => "aside:done",
            ServerMessage::AsideError { .. } => "aside:error",
            ServerMessage::Error { .. } => "error",
            ServerMessage::QuotaWarning { .. } => "quota:warning",
            ServerMessage::QuotaExhausted => "quota:exhausted",
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Main turn cycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_turn_cycle_streams_partner_then_coach() {
    let h = harness(
        session("partner-model", None),
        vec![
            ScriptedCall::Events(vec![delta("Hel"), delta("lo"), done(50, 60)]),
            ScriptedCall::Events(vec![delta("Good "), delta("opener"), done(40, 50)]),
        ],
    )
    .await;

    h.orchestrator.handle_user_message("Hi".into()).await;

    let frames = h.client.frames();
    assert_eq!(
        frame_types(&frames),
        vec![
            "history",
            "partner:delta",
            "partner:delta",
            "partner:done",
            "coach:delta",
            "coach:delta",
            "coach:done",
        ]
    );

    // Concatenated deltas equal the persisted content, in arrival order
    let messages = h.store.all_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Partner);
    assert_eq!(messages[1].content, "Hello");
    assert_eq!(messages[2].role, MessageRole::Coach);
    assert_eq!(messages[2].content, "Good opener");
    assert!(messages.iter().all(|m| m.thread == Thread::Main));

    let usage = h.store.all_usage();
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].stream, StreamKind::Partner);
    assert_eq!(usage[0].usage.total(), 110);
    assert_eq!(usage[1].stream, StreamKind::Coach);

    // Observers saw the same conversation frames
    assert_eq!(frame_types(&h.observers.frames()), frame_types(&frames));
}

#[tokio::test]
async fn partner_context_excludes_coach_and_asides() {
    let h = harness(
        session("partner-model", None),
        vec![
            ScriptedCall::Events(vec![delta("reply"), done(1, 1)]),
            ScriptedCall::Events(vec![delta("advice"), done(1, 1)]),
        ],
    )
    .await;

    // Seed a prior turn plus an aside exchange directly in the store
    for message in [
        NewMessage::main("sess_1", MessageRole::User, "earlier ask"),
        NewMessage::main("sess_1", MessageRole::Partner, "earlier reply"),
        NewMessage::main("sess_1", MessageRole::Coach, "earlier advice"),
        NewMessage::aside("sess_1", MessageRole::User, "secret question", "t0"),
        NewMessage::aside("sess_1", MessageRole::Coach, "secret answer", "t0"),
    ] {
        let _ = h.store.create_message(message).await.unwrap();
    }
    let h = {
        // Reload so the orchestrator sees the seeded history
        let record = h.store.load_session("sess_1").await.unwrap();
        let factory = Arc::clone(&h.factory);
        let client = Arc::new(RecordingSink::default());
        Harness {
            orchestrator: Arc::new(Orchestrator::new(
                record,
                Arc::clone(&h.store) as Arc<dyn ConversationStore>,
                Arc::clone(&factory) as Arc<dyn ProviderFactory>,
                Arc::clone(&client) as Arc<dyn FrameSink>,
                Arc::clone(&h.observers) as Arc<dyn FrameSink>,
                OrchestratorConfig::default(),
            )),
            client,
            ..h
        }
    };

    h.orchestrator.handle_user_message("new ask".into()).await;

    let requests = h.factory.requests();
    assert_eq!(requests.len(), 2);

    // Partner call: clean two-party transcript, nothing leaked
    let partner = &requests[0];
    let partner_text: Vec<&str> = partner.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(partner_text, vec!["earlier ask", "earlier reply", "new ask"]);

    // Coach call: labeled full main thread, asides still excluded
    let coach = &requests[1];
    let coach_text: Vec<&str> = coach.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        coach_text,
        vec![
            "earlier ask",
            "[Partner] earlier reply",
            "[Your previous advice] earlier advice",
            "new ask",
            "[Partner] reply",
        ]
    );
    assert!(coach_text.iter().all(|t| !t.contains("secret")));
}

#[tokio::test]
async fn second_submit_while_processing_is_rate_limited() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        session("partner-model", None),
        vec![
            ScriptedCall::Gated(vec![delta("slow reply"), done(1, 1)], Arc::clone(&gate)),
            ScriptedCall::Events(vec![delta("advice"), done(1, 1)]),
        ],
    )
    .await;

    let first = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move { orchestrator.handle_user_message("first".into()).await })
    };
    tokio::task::yield_now().await;

    // The second submit lands while the partner stream is in flight
    h.orchestrator.handle_user_message("second".into()).await;

    let rejected = h
        .client
        .frames()
        .into_iter()
        .filter(|f| matches!(f, ServerMessage::Error { code, recoverable: true, .. }
            if *code == parley_core::errors::ErrorCode::RateLimited))
        .count();
    assert_eq!(rejected, 1);

    gate.notify_one();
    first.await.unwrap();

    // Only the first submit produced a turn
    let messages = h.store.all_messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content, "first");
    assert!(messages.iter().all(|m| m.content != "second"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Quota
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exhausted_quota_blocks_before_persistence() {
    let h = harness(session("partner-model", Some(invitation(1000))), vec![]).await;
    h.store
        .log_usage(NewUsageRecord {
            session_id: "sess_1".into(),
            user_id: "user_1".into(),
            invitation_id: Some("inv_1".into()),
            stream: StreamKind::Partner,
            usage: TokenUsage {
                input_tokens: 400,
                output_tokens: 600,
            },
        })
        .await
        .unwrap();

    h.orchestrator.handle_user_message("one more?".into()).await;

    assert_eq!(frame_types(&h.client.frames()), vec!["quota:exhausted"]);
    // No message row and no provider call
    assert!(h.store.all_messages().is_empty());
    assert!(h.factory.models().is_empty());
}

#[tokio::test]
async fn quota_warning_emitted_after_turn() {
    let h = harness(
        session("partner-model", Some(invitation(1000))),
        vec![
            ScriptedCall::Events(vec![delta("reply"), done(50, 60)]),
            ScriptedCall::Events(vec![delta("advice"), done(40, 50)]),
        ],
    )
    .await;
    h.store
        .log_usage(NewUsageRecord {
            session_id: "sess_1".into(),
            user_id: "user_1".into(),
            invitation_id: Some("inv_1".into()),
            stream: StreamKind::Partner,
            usage: TokenUsage {
                input_tokens: 300,
                output_tokens: 400,
            },
        })
        .await
        .unwrap();

    h.orchestrator.handle_user_message("hi".into()).await;

    // 700 pre-consumed + 110 + 90 leaves 100 of 1000: under the 20% line
    let frames = h.client.frames();
    assert!(matches!(
        frames.last(),
        Some(ServerMessage::QuotaWarning {
            remaining: 100,
            total: 1000
        })
    ));
    // Observers are told as well
    assert!(h
        .observers
        .frames()
        .iter()
        .any(|f| matches!(f, ServerMessage::QuotaWarning { .. })));
}

#[tokio::test]
async fn coach_failure_still_reports_quota_crossings() {
    let h = harness(
        session("partner-model", Some(invitation(1000))),
        vec![
            ScriptedCall::Events(vec![delta("reply"), done(400, 600)]),
            ScriptedCall::Events(vec![Err(ProviderError::Api {
                status: 500,
                message: "coach upstream died".into(),
                code: None,
                retryable: false,
            })]),
        ],
    )
    .await;

    h.orchestrator.handle_user_message("hi".into()).await;

    // The partner stream alone drained the invitation; the client hears
    // about it in this turn, not on the next submit's hard gate.
    let frames = h.client.frames();
    assert!(matches!(frames.last(), Some(ServerMessage::QuotaExhausted)));
    assert!(frames.iter().any(|f| matches!(
        f,
        ServerMessage::Error { code, recoverable: true, .. }
            if *code == parley_core::errors::ErrorCode::ProviderError
    )));

    // Only the partner call produced a usage row
    let usage = h.store.all_usage();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].stream, StreamKind::Partner);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure handling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn partner_failure_persists_partial_and_skips_coach() {
    let h = harness(
        session("partner-model", None),
        vec![ScriptedCall::Events(vec![
            delta("partial "),
            Err(ProviderError::Api {
                status: 500,
                message: "upstream died".into(),
                code: None,
                retryable: true,
            }),
        ])],
    )
    .await;

    h.orchestrator.handle_user_message("hi".into()).await;

    // Exactly one recoverable PROVIDER_ERROR, and no coach call ever made
    let errors: Vec<_> = h
        .client
        .frames()
        .into_iter()
        .filter(|f| matches!(f, ServerMessage::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        ServerMessage::Error { code, recoverable: true, .. }
            if *code == parley_core::errors::ErrorCode::ProviderError
    ));
    assert_eq!(h.factory.models().len(), 1);

    // Partial partner content persisted with the incomplete marker
    let messages = h.store.all_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Partner);
    assert_eq!(messages[1].content, "partial ");
    let metadata = messages[1].metadata.as_ref().unwrap();
    assert!(metadata.incomplete);
    assert!(metadata.error.as_ref().unwrap().contains("upstream died"));

    // No usage logged for the failed turn
    assert!(h.store.all_usage().is_empty());
}

#[tokio::test]
async fn quota_class_failure_switches_to_fallback_model() {
    let h = harness(
        session("gemini-2.0-flash", None),
        vec![
            ScriptedCall::FailCreate(quota_error()),
            ScriptedCall::Events(vec![delta("fallback reply"), done(1, 1)]),
            ScriptedCall::Events(vec![delta("advice"), done(1, 1)]),
        ],
    )
    .await;

    h.orchestrator.handle_user_message("hi".into()).await;

    // Search-capable model hit a quota error: one substitution, search off
    assert_eq!(
        h.factory.models(),
        vec!["gemini-2.0-flash", "gpt-4o-mini", "coach-model"]
    );
    let requests = h.factory.requests();
    assert_eq!(requests[0].model, "gpt-4o-mini");
    assert!(!requests[0].web_search);

    let messages = h.store.all_messages();
    assert_eq!(messages[1].content, "fallback reply");
}

// ─────────────────────────────────────────────────────────────────────────────
// Asides
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn aside_answers_on_its_own_thread() {
    let h = harness(
        session("partner-model", Some(invitation(100_000))),
        vec![ScriptedCall::Events(vec![delta("An"), delta("swer"), done(3, 4)])],
    )
    .await;

    h.orchestrator
        .handle_aside_start("t1".into(), "Was that too blunt?".into())
        .await;

    let frames = h.client.frames();
    assert_eq!(
        frame_types(&frames),
        vec!["history", "aside:delta", "aside:delta", "aside:done"]
    );

    let messages = h.store.all_messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.thread == Thread::Aside));
    assert!(messages.iter().all(|m| m.thread_id.as_deref() == Some("t1")));
    assert_eq!(messages[1].content, "Answer");

    // Coach model, no web search, framed question
    let requests = h.factory.requests();
    assert_eq!(requests[0].model, "coach-model");
    assert!(!requests[0].web_search);
    assert!(requests[0].system_prompt.starts_with("You coach the candidate."));
    assert!(requests[0].system_prompt.contains("[ASIDE QUESTION]"));
    assert_eq!(
        requests[0].messages.last().unwrap().content,
        "[ASIDE QUESTION] Was that too blunt?"
    );

    // Aside usage counts against the invitation
    let usage = h.store.all_usage();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].stream, StreamKind::Aside);
    assert_eq!(usage[0].invitation_id.as_deref(), Some("inv_1"));
}

#[tokio::test]
async fn aside_rejected_while_main_turn_active() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        session("partner-model", None),
        vec![
            ScriptedCall::Gated(vec![delta("reply"), done(1, 1)], Arc::clone(&gate)),
            ScriptedCall::Events(vec![delta("advice"), done(1, 1)]),
        ],
    )
    .await;

    let main = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move { orchestrator.handle_user_message("hi".into()).await })
    };
    tokio::task::yield_now().await;

    h.orchestrator.handle_aside_start("t1".into(), "quick q".into()).await;

    assert!(h.client.frames().iter().any(|f| matches!(
        f,
        ServerMessage::AsideError { thread_id, code, .. }
            if thread_id == "t1" && *code == parley_core::errors::ErrorCode::AsideBusy
    )));

    gate.notify_one();
    main.await.unwrap();

    // The rejected aside left no rows behind
    assert!(h.store.all_messages().iter().all(|m| m.thread == Thread::Main));
}

#[tokio::test]
async fn aside_cancel_keeps_partial_and_frees_the_slot() {
    let h = harness(
        session("partner-model", None),
        vec![
            ScriptedCall::Hang(vec![delta("half an answ")]),
            ScriptedCall::Events(vec![delta("second answer"), done(1, 1)]),
        ],
    )
    .await;

    let aside = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move {
            orchestrator.handle_aside_start("t1".into(), "q1".into()).await;
        })
    };
    // Wait for the first fragment to stream before cancelling
    while !h
        .client
        .frames()
        .iter()
        .any(|f| matches!(f, ServerMessage::AsideDelta { .. }))
    {
        tokio::task::yield_now().await;
    }

    h.orchestrator.handle_aside_cancel("t1".into()).await;
    aside.await.unwrap();

    // Partial answer kept, marked incomplete; no terminal aside frame
    let messages = h.store.all_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "half an answ");
    assert!(messages[1].metadata.as_ref().unwrap().incomplete);
    let frames = h.client.frames();
    assert!(!frames.iter().any(|f| matches!(
        f,
        ServerMessage::AsideDone { .. } | ServerMessage::AsideError { .. }
    )));

    // The slot is free: a new aside starts immediately
    h.orchestrator.handle_aside_start("t2".into(), "q2".into()).await;
    assert!(h
        .client
        .frames()
        .iter()
        .any(|f| matches!(f, ServerMessage::AsideDone { thread_id, .. } if thread_id == "t2")));
}

// ─────────────────────────────────────────────────────────────────────────────
// Resume
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_replays_from_store_after_cursor() {
    let h = harness(session("partner-model", None), vec![]).await;
    let mut ids = Vec::new();
    for message in [
        NewMessage::main("sess_1", MessageRole::User, "one"),
        NewMessage::main("sess_1", MessageRole::Partner, "two"),
        NewMessage::aside("sess_1", MessageRole::User, "three", "t1"),
        NewMessage::main("sess_1", MessageRole::Coach, "four"),
    ] {
        ids.push(h.store.create_message(message).await.unwrap().id);
    }

    h.orchestrator.handle_resume(Some(ids[1])).await;

    let frames = h.client.frames();
    assert_eq!(frames.len(), 1);
    let ServerMessage::History { messages } = &frames[0] else {
        panic!("expected a history frame");
    };
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "three");
    assert_eq!(messages[0].thread_id.as_deref(), Some("t1"));
    assert_eq!(messages[1].content, "four");
    assert!(messages.windows(2).all(|w| w[0].id < w[1].id));

    // Nothing was broadcast: resume is a private replay
    assert!(h.observers.frames().is_empty());
}

#[tokio::test]
async fn resume_without_cursor_replays_everything() {
    let h = harness(session("partner-model", None), vec![]).await;
    for text in ["a", "b"] {
        let _ = h
            .store
            .create_message(NewMessage::main("sess_1", MessageRole::User, text))
            .await
            .unwrap();
    }

    h.orchestrator.handle_resume(None).await;

    let frames = h.client.frames();
    let ServerMessage::History { messages } = &frames[0] else {
        panic!("expected a history frame");
    };
    assert_eq!(messages.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_sends_connected_then_history() {
    let h = harness(session("partner-model", None), vec![]).await;
    h.orchestrator.initialize().await;

    let frames = h.client.frames();
    assert_eq!(frame_types(&frames), vec!["connected", "history"]);
    assert!(matches!(
        &frames[0],
        ServerMessage::Connected { session_id, .. } if session_id == "sess_1"
    ));
}

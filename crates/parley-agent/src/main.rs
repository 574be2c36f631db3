//! # parley-agent
//!
//! Parley server binary — wires the store, provider factory, and the
//! HTTP/WebSocket server together and runs until ctrl-c.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_core::quota::QuotaDefinition;
use parley_core::session::{InvitationLink, PromptConfig, RolePrompt, Scenario, SessionRecord};
use parley_llm::openai::OpenAiCompatibleFactory;
use parley_llm::provider::ProviderFactory;
use parley_runtime::OrchestratorConfig;
use parley_server::{ParleyServer, ServerConfig};
use parley_store::MemoryStore;

/// Parley conversation practice server.
#[derive(Parser, Debug)]
#[command(name = "parley-agent", about = "Parley conversation practice server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "9470")]
    port: u16,

    /// API key for the completions backend (falls back to OPENAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Override for the completions API base URL (gateway deployments).
    #[arg(long)]
    base_url: Option<String>,

    /// Seed an in-memory dev session (`sess_dev`, user `dev`) at startup.
    #[arg(long)]
    dev_session: bool,

    /// Partner model for the dev session.
    #[arg(long, default_value = "gemini-2.0-flash")]
    partner_model: String,

    /// Coach model for the dev session.
    #[arg(long, default_value = "gpt-4o-mini")]
    coach_model: String,
}

impl Cli {
    fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default()
    }
}

/// The session seeded by `--dev-session`.
fn dev_session(partner_model: &str, coach_model: &str) -> SessionRecord {
    SessionRecord {
        id: "sess_dev".into(),
        user_id: "dev".into(),
        prompts: PromptConfig::Scenario(Scenario {
            name: "Salary negotiation".into(),
            persona: "A skeptical hiring manager at a mid-size tech company".into(),
            partner: RolePrompt {
                model: partner_model.into(),
                system_prompt: "You are a skeptical hiring manager negotiating \
                                an offer. Stay in character and push back on \
                                weak arguments."
                    .into(),
            },
            coach: RolePrompt {
                model: coach_model.into(),
                system_prompt: "You are a negotiation coach. After each partner \
                                reply, give the user short, concrete advice on \
                                their next move."
                    .into(),
            },
        }),
        invitation: Some(InvitationLink {
            invitation_id: "inv_dev".into(),
            quota: QuotaDefinition {
                total_tokens: 50_000,
            },
        }),
        messages: Vec::new(),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging();

    let store = Arc::new(MemoryStore::new());
    if args.dev_session {
        store.insert_session(dev_session(&args.partner_model, &args.coach_model));
        tracing::info!("dev session seeded (connect as /ws/session/sess_dev?user=dev)");
    }

    let api_key = args.resolved_api_key();
    let providers: Arc<dyn ProviderFactory> =
        Arc::new(OpenAiCompatibleFactory::new(api_key.clone(), args.base_url.clone()));

    // Verify credentials reach the factory; calls fail with a typed error
    // frame either way, this just surfaces the misconfiguration at boot.
    if providers.create_for_model("gpt-4o-mini").await.is_err() {
        tracing::warn!("no API key configured — provider calls will fail (set OPENAI_API_KEY or --api-key)");
    }

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..ServerConfig::default()
    };
    let server = ParleyServer::new(config, store, providers, OrchestratorConfig::default());

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("parley listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("shutdown complete");
    Ok(())
}

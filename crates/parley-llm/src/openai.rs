//! OpenAI-compatible chat completions adapter.
//!
//! Speaks the `/chat/completions` streaming dialect, which the deployment's
//! model gateway exposes for every catalog model (including the
//! search-capable ones). Deltas arrive as SSE chunks; the final chunk
//! carries token usage when `stream_options.include_usage` is set, which
//! this adapter always requests so the orchestrator can account quota.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use parley_core::usage::TokenUsage;

use crate::provider::{
    ChatRole, CompletionRequest, CompletionStream, Provider, ProviderError, ProviderFactory,
    ProviderResult, StreamEvent,
};
use crate::sse::parse_sse_lines;

/// Default base URL for the completions API.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Response token cap applied when the request does not set one.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Configuration for one adapter instance.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Model identifier sent with each request.
    pub model: String,
    /// Bearer token.
    pub api_key: String,
    /// Override for the API base URL (gateway deployments).
    pub base_url: Option<String>,
}

/// OpenAI-compatible streaming provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create an adapter with its own HTTP client.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create an adapter sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(config: OpenAiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", self.config.api_key);
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| ProviderError::Auth {
                message: format!("invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        for message in &request.messages {
            let role = match message.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": message.content }));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        });
        if request.web_search {
            body["web_search_options"] = json!({});
        }
        body
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<CompletionStream> {
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/chat/completions");
        let headers = self.build_headers()?;
        let body = Self::build_body(request);

        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            web_search = request.web_search,
            "sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body_text = response.text().await.unwrap_or_default();
            let (message, code) = parse_api_error(&body_text);
            error!(
                status = status.as_u16(),
                code = code.as_deref().unwrap_or("unknown"),
                "completion API error"
            );
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited {
                    retry_after_ms,
                    message,
                });
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
                code,
                retryable: status.is_server_error() || status.as_u16() == 408,
            });
        }

        let sse_lines = parse_sse_lines(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut lines = std::pin::pin!(sse_lines);
            let mut usage: Option<TokenUsage> = None;
            let mut finished = false;

            while let Some(data) = lines.next().await {
                let Some(chunk) = parse_chunk(&data) else { continue };
                if let Some(text) = chunk.delta {
                    if !text.is_empty() {
                        yield Ok(StreamEvent::Delta { text });
                    }
                }
                if let Some(reported) = chunk.usage {
                    usage = Some(reported);
                }
                finished |= chunk.finished;
            }

            // Done only when the backend signalled completion; a silent
            // drop propagates as an ended-without-done stream.
            if finished || usage.is_some() {
                yield Ok(StreamEvent::Done {
                    usage: usage.unwrap_or_default(),
                });
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Factory producing [`OpenAiProvider`] instances for catalog models.
///
/// One shared HTTP client backs every provider, so connection pools survive
/// model substitutions mid-conversation.
pub struct OpenAiCompatibleFactory {
    client: reqwest::Client,
    api_key: String,
    base_url: Option<String>,
}

impl OpenAiCompatibleFactory {
    /// Create a factory with the given credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url,
        }
    }
}

#[async_trait]
impl ProviderFactory for OpenAiCompatibleFactory {
    async fn create_for_model(&self, model: &str) -> ProviderResult<Arc<dyn Provider>> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Auth {
                message: "no API key configured".to_owned(),
            });
        }
        let config = OpenAiConfig {
            model: model.to_owned(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        };
        Ok(Arc::new(OpenAiProvider::with_client(
            config,
            self.client.clone(),
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Relevant content of one streamed chunk.
struct ParsedChunk {
    delta: Option<String>,
    usage: Option<TokenUsage>,
    finished: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn parse_chunk(data: &str) -> Option<ParsedChunk> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "unparseable completion chunk");
            return None;
        }
    };
    let (delta, finished) = chunk
        .choices
        .first()
        .map_or((None, false), |choice| {
            (choice.delta.content.clone(), choice.finish_reason.is_some())
        });
    Some(ParsedChunk {
        delta,
        usage: chunk.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        finished,
    })
}

fn parse_api_error(body: &str) -> (String, Option<String>) {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(default)]
        message: String,
        #[serde(default)]
        code: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (
            if body.is_empty() {
                "request failed".to_owned()
            } else {
                body.to_owned()
            },
            None,
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Ollama local model host.
//!
//! Connects to a local Ollama instance and keeps conversation history on the
//! client side, replaying it on every `/api/chat` call. A model that is not
//! installed yet is fetched with `/api/pull`, either when a session is
//! created or when a caller asks for a download.
//!
//! # Example
//!
//! ```ignore
//! use distill_models::providers::OllamaHost;
//!
//! let host = OllamaHost::new();  // Uses localhost:11434
//! let host = OllamaHost::with_base_url("http://192.168.1.100:11434")
//!     .model("qwen2.5:7b")
//!     .context_window(16_384);
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Message, ModelHost, ModelSession, ResponseStream, SessionHandle};
use crate::{Availability, Error, Result, SessionOptions};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Context window requested from Ollama when none is configured.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 8192;

// ────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ────────────────────────────────────────────────────────────────────────────

/// Response from Ollama's `/api/tags` endpoint.
#[derive(Debug, Deserialize)]
pub struct OllamaTagsResponse {
    pub models: Vec<OllamaModel>,
}

/// Installed model as listed by `/api/tags`.
#[derive(Debug, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

/// Request body for Ollama's `/api/pull` endpoint.
#[derive(Debug, Serialize)]
pub struct OllamaPullRequest {
    pub model: String,
    pub stream: bool,
}

/// Final (non-streamed) response from `/api/pull`.
#[derive(Debug, Deserialize)]
pub struct OllamaPullResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Message in an Ollama chat request/response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OllamaChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl OllamaChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            images: None,
        }
    }
}

impl From<&Message> for OllamaChatMessage {
    fn from(message: &Message) -> Self {
        let images: Vec<String> = message
            .content
            .images()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.as_text(),
            images: if images.is_empty() { None } else { Some(images) },
        }
    }
}

/// Request body for Ollama's `/api/chat` endpoint.
#[derive(Debug, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaChatMessage>,
    pub stream: bool,
    /// JSON schema constraining the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,
    pub options: OllamaChatOptions,
}

/// Sampling options for Ollama.
#[derive(Debug, Serialize)]
pub struct OllamaChatOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub num_ctx: u32,
}

/// Response (or streamed line) from Ollama's `/api/chat` endpoint.
#[derive(Debug, Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub message: Option<OllamaChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OllamaChatResponse {
    fn content(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.content.as_str())
    }

    /// Tokens held by the conversation after this reply.
    fn context_tokens(&self) -> Option<u64> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(prompt.unwrap_or(0) + eval.unwrap_or(0)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OllamaHost
// ────────────────────────────────────────────────────────────────────────────

/// Connection settings shared by a host and all its sessions.
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    model: String,
    context_window: u32,
    client: reqwest::Client,
}

impl Endpoint {
    /// Installed models. Connection failures are [`Error::Request`].
    async fn tags(&self) -> Result<OllamaTagsResponse> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ProviderApi(format!(
                "Ollama API returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ProviderApi(format!("unreadable model list: {e}")))
    }

    /// Download the configured model, returning when Ollama has finished.
    async fn pull(&self) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);
        let request = OllamaPullRequest {
            model: self.model.clone(),
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "Ollama pull returned {}: {}",
                status, body
            )));
        }

        let outcome: OllamaPullResponse = response
            .json()
            .await
            .map_err(|e| Error::ProviderApi(format!("unreadable pull response: {e}")))?;
        match outcome.error {
            Some(error) => Err(Error::ProviderApi(error)),
            None => {
                debug!(model = %self.model, status = ?outcome.status, "Pull finished");
                Ok(())
            }
        }
    }

    async fn chat(&self, request: &OllamaChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "Ollama API returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

/// Progress of the host's model download.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PullPhase {
    Idle,
    Pulling,
    Failed(String),
}

/// Model host backed by a local Ollama server.
///
/// At most one pull runs per host; clones of the download state are shared
/// with the background task driving it.
pub struct OllamaHost {
    endpoint: Endpoint,
    pull: Arc<watch::Sender<PullPhase>>,
}

impl OllamaHost {
    /// Create a host with the default URL (localhost:11434).
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a host with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                model: DEFAULT_MODEL.to_string(),
                context_window: DEFAULT_CONTEXT_WINDOW,
                client: reqwest::Client::new(),
            },
            pull: Arc::new(watch::channel(PullPhase::Idle).0),
        }
    }

    /// Set the model every session talks to.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.endpoint.model = model.into();
        self
    }

    /// Set the context window requested for each session.
    pub fn context_window(mut self, tokens: u32) -> Self {
        self.endpoint.context_window = tokens;
        self
    }

    /// Get the base URL for this host.
    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    /// Get the configured model name.
    pub fn model_name(&self) -> &str {
        &self.endpoint.model
    }

    /// Start pulling the model unless a pull is already running.
    ///
    /// Returns whether a new pull was started.
    fn start_pull(&self) -> bool {
        let started = self.pull.send_if_modified(|phase| {
            if *phase == PullPhase::Pulling {
                false
            } else {
                *phase = PullPhase::Pulling;
                true
            }
        });
        if !started {
            return false;
        }

        info!(model = %self.endpoint.model, "Pulling model into Ollama");
        let endpoint = self.endpoint.clone();
        let pull = self.pull.clone();
        tokio::spawn(async move {
            let outcome = match endpoint.pull().await {
                Ok(()) => {
                    info!(model = %endpoint.model, "Model pulled");
                    PullPhase::Idle
                }
                Err(e) => {
                    warn!(model = %endpoint.model, error = %e, "Model pull failed");
                    PullPhase::Failed(e.to_string())
                }
            };
            pull.send_replace(outcome);
        });
        true
    }

    /// Make sure the model is installed, pulling it and waiting if needed.
    async fn ensure_model(&self) -> Result<()> {
        if self.has_model(&self.endpoint.tags().await?) {
            return Ok(());
        }

        self.start_pull();
        let mut phase = self.pull.subscribe();
        let outcome = phase
            .wait_for(|p| *p != PullPhase::Pulling)
            .await
            .map_err(|_| Error::ModelUnavailable("model pull was abandoned".to_string()))?
            .clone();
        match outcome {
            PullPhase::Failed(reason) => Err(Error::ModelUnavailable(format!(
                "could not pull {}: {reason}",
                self.endpoint.model
            ))),
            PullPhase::Idle | PullPhase::Pulling => Ok(()),
        }
    }

    /// Whether `tags` lists the configured model (`name` or `name:latest`).
    fn has_model(&self, tags: &OllamaTagsResponse) -> bool {
        let wanted = &self.endpoint.model;
        tags.models.iter().any(|m| {
            m.name == *wanted
                || (!wanted.contains(':') && m.name.strip_suffix(":latest") == Some(wanted.as_str()))
        })
    }
}

impl Default for OllamaHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelHost for OllamaHost {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn availability(&self) -> Result<Availability> {
        let tags = match self.endpoint.tags().await {
            Ok(tags) => tags,
            Err(Error::Request(e)) => {
                debug!(url = %self.endpoint.base_url, error = %e, "Ollama not reachable");
                return Ok(Availability::Unavailable);
            }
            Err(e) => return Err(e),
        };

        if self.has_model(&tags) {
            return Ok(Availability::Available);
        }
        Ok(match &*self.pull.borrow() {
            PullPhase::Idle => Availability::Downloadable,
            PullPhase::Pulling => Availability::Downloading,
            PullPhase::Failed(reason) => {
                debug!(model = %self.endpoint.model, reason = %reason, "Earlier pull failed");
                Availability::Unavailable
            }
        })
    }

    async fn download(&self) -> Result<()> {
        self.start_pull();
        Ok(())
    }

    async fn create(&self, options: &SessionOptions) -> Result<SessionHandle> {
        self.ensure_model().await?;
        let endpoint = Arc::new(self.endpoint.clone());
        Ok(Box::new(OllamaSession::new(endpoint, options.clone())))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OllamaSession
// ────────────────────────────────────────────────────────────────────────────

type History = Arc<Mutex<Vec<OllamaChatMessage>>>;

fn lock(history: &Mutex<Vec<OllamaChatMessage>>) -> MutexGuard<'_, Vec<OllamaChatMessage>> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One conversation against an Ollama model.
pub struct OllamaSession {
    id: String,
    options: SessionOptions,
    endpoint: Arc<Endpoint>,
    history: History,
    context_tokens: Arc<AtomicU64>,
}

impl OllamaSession {
    fn new(endpoint: Arc<Endpoint>, options: SessionOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            options,
            endpoint,
            history: Arc::new(Mutex::new(Vec::new())),
            context_tokens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build a chat request replaying the system prompt and history before `input`.
    fn request(
        &self,
        input: &str,
        stream: bool,
        format: Option<serde_json::Value>,
    ) -> OllamaChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &self.options.system_prompt {
            messages.push(OllamaChatMessage::new("system", system.as_str()));
        }
        messages.extend(lock(&self.history).iter().cloned());
        messages.push(OllamaChatMessage::new("user", input));

        OllamaChatRequest {
            model: self.endpoint.model.clone(),
            messages,
            stream,
            format,
            options: OllamaChatOptions {
                temperature: self.options.temperature,
                top_k: self.options.top_k,
                num_ctx: self.endpoint.context_window,
            },
        }
    }
}

#[async_trait]
impl ModelSession for OllamaSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn prompt(
        &mut self,
        input: &str,
        constraint: Option<&serde_json::Value>,
    ) -> Result<String> {
        let request = self.request(input, false, constraint.cloned());
        let response = self.endpoint.chat(&request).await?;
        let reply: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(Error::ProviderApi(error));
        }
        if let Some(tokens) = reply.context_tokens() {
            self.context_tokens.store(tokens, Ordering::Relaxed);
        }

        let content = reply.content().to_string();
        let mut history = lock(&self.history);
        history.push(OllamaChatMessage::new("user", input));
        history.push(OllamaChatMessage::new("assistant", content.as_str()));
        Ok(content)
    }

    async fn prompt_streaming(&mut self, input: &str) -> Result<ResponseStream> {
        let request = self.request(input, true, None);
        let response = self.endpoint.chat(&request).await?;
        Ok(Box::pin(ReplyStream {
            inner: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
            exhausted: false,
            reply: String::new(),
            prompt: Some(OllamaChatMessage::new("user", input)),
            history: self.history.clone(),
            context_tokens: self.context_tokens.clone(),
        }))
    }

    async fn append(&mut self, messages: Vec<Message>) -> Result<()> {
        lock(&self.history).extend(messages.iter().map(OllamaChatMessage::from));
        Ok(())
    }

    async fn clone_session(&self) -> Result<SessionHandle> {
        Ok(Box::new(OllamaSession::new(
            self.endpoint.clone(),
            self.options.clone(),
        )))
    }

    async fn destroy(&mut self) {
        lock(&self.history).clear();
        self.context_tokens.store(0, Ordering::Relaxed);
    }

    fn input_usage(&self) -> u64 {
        self.context_tokens.load(Ordering::Relaxed)
    }

    fn input_quota(&self) -> u64 {
        u64::from(self.endpoint.context_window)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Streaming
// ────────────────────────────────────────────────────────────────────────────

/// Splits Ollama's NDJSON body into text deltas.
///
/// The exchange is written to the session history only once the body has
/// been read to the end; a stream dropped early leaves the history untouched.
struct ReplyStream<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    exhausted: bool,
    reply: String,
    prompt: Option<OllamaChatMessage>,
    history: History,
    context_tokens: Arc<AtomicU64>,
}

/// Remove and return the first complete line in `buffer`.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).trim().to_string())
}

impl<S> ReplyStream<S> {
    fn handle_line(&mut self, line: &str) -> Result<Option<String>> {
        if line.is_empty() {
            return Ok(None);
        }
        let chunk: OllamaChatResponse = serde_json::from_str(line)?;
        if let Some(error) = chunk.error {
            return Err(Error::ProviderApi(error));
        }
        if chunk.done
            && let Some(tokens) = chunk.context_tokens()
        {
            self.context_tokens.store(tokens, Ordering::Relaxed);
        }
        let delta = chunk.content();
        if delta.is_empty() {
            return Ok(None);
        }
        self.reply.push_str(delta);
        Ok(Some(delta.to_string()))
    }

    fn commit(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            let mut history = lock(&self.history);
            history.push(prompt);
            history.push(OllamaChatMessage::new("assistant", self.reply.as_str()));
        }
    }
}

impl<S, B> Stream for ReplyStream<S>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = take_line(&mut this.buffer) {
                match this.handle_line(&line) {
                    Ok(Some(delta)) => return Poll::Ready(Some(Ok(delta))),
                    Ok(None) => continue,
                    Err(e) => {
                        this.prompt = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if this.exhausted {
                this.commit();
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(bytes.as_ref()),
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    this.prompt = None;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(Error::Request(e.to_string()))));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if !this.buffer.is_empty() {
                        this.buffer.push(b'\n');
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

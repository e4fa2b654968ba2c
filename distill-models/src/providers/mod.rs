//! Model host contract and implementations.
//!
//! A [`ModelHost`] is the runtime that owns the model (a local Ollama server,
//! a browser-provided model, a mock). It reports [`Availability`] and opens
//! [`ModelSession`]s. A session is one stateful conversation with its own
//! context budget; every prompt grows that context until the session is
//! cloned or destroyed.
//!
//! # Example
//!
//! ```ignore
//! use distill_models::providers::{ModelHost, ModelSession};
//! use distill_models::SessionOptions;
//!
//! async fn ask(host: &dyn ModelHost) -> distill_models::Result<String> {
//!     let mut session = host.create(&SessionOptions::default()).await?;
//!     let answer = session.prompt("Hello!", None).await?;
//!     session.destroy().await;
//!     Ok(answer)
//! }
//! ```

pub mod ollama;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

pub use ollama::{OllamaHost, OllamaSession};
pub use types::*;

use crate::{Availability, ContextUsage, Result, SessionOptions};

/// Incremental text fragments of a streaming reply.
///
/// Dropping the stream releases the underlying reader.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An owned session. Moving the box moves ownership of the conversation.
pub type SessionHandle = Box<dyn ModelSession>;

/// Runtime able to report model readiness and open sessions.
#[async_trait]
pub trait ModelHost: Send + Sync {
    /// Host identifier used in logs (e.g. "ollama").
    fn name(&self) -> &str;

    /// Current readiness of the model.
    async fn availability(&self) -> Result<Availability>;

    /// Start fetching a [`Downloadable`](Availability::Downloadable) model.
    ///
    /// Returns once the download is under way; progress shows up as
    /// [`Downloading`](Availability::Downloading). Hosts that cannot download
    /// models keep this default.
    async fn download(&self) -> Result<()> {
        Ok(())
    }

    /// Open a new session configured with `options`.
    async fn create(&self, options: &SessionOptions) -> Result<SessionHandle>;
}

/// One stateful conversation with the model.
///
/// # Required Methods
///
/// - [`prompt`](ModelSession::prompt) - full reply, optionally shape-constrained
/// - [`prompt_streaming`](ModelSession::prompt_streaming) - reply as a stream of fragments
/// - [`append`](ModelSession::append) - add context messages without asking for a reply
/// - [`clone_session`](ModelSession::clone_session) - same initial prompts, empty history
/// - [`destroy`](ModelSession::destroy) - release the context
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Stable identifier, unique per session (clones get a new one).
    fn id(&self) -> &str;

    /// Options the session was created with.
    fn options(&self) -> &SessionOptions;

    /// Send `input` and wait for the whole reply.
    ///
    /// When `constraint` is set it is a JSON schema the host should steer the
    /// reply towards. Hosts treat it as a hint; callers still validate.
    async fn prompt(
        &mut self,
        input: &str,
        constraint: Option<&serde_json::Value>,
    ) -> Result<String>;

    /// Send `input` and receive the reply incrementally.
    async fn prompt_streaming(&mut self, input: &str) -> Result<ResponseStream>;

    /// Add messages to the context without prompting.
    async fn append(&mut self, messages: Vec<Message>) -> Result<()>;

    /// Open a sibling session with the same options and initial prompts but
    /// none of this session's conversation history.
    async fn clone_session(&self) -> Result<SessionHandle>;

    /// Release the context held by this session.
    async fn destroy(&mut self);

    /// Tokens currently held in the context.
    fn input_usage(&self) -> u64;

    /// Maximum tokens the context may hold.
    fn input_quota(&self) -> u64;

    /// Usage counters combined.
    fn usage(&self) -> ContextUsage {
        ContextUsage::new(self.input_usage(), self.input_quota())
    }
}

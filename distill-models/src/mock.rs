//! Scriptable in-memory host for tests.
//!
//! Replies are taken from a queue first, then from an optional responder
//! closure, and default to an empty string. Every session shares one ledger,
//! so tests can assert on created/destroyed counts and the prompts and
//! context messages a host received.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::providers::{Message, ModelHost, ModelSession, ResponseStream, SessionHandle};
use crate::{Availability, Error, Result, SessionOptions};

/// Scripted reply for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Whole reply in one piece (streamed as a single chunk).
    Text(String),
    /// Reply delivered as separate streaming fragments.
    Chunks(Vec<String>),
    /// The service rejects the prompt.
    Fail(String),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// A prompt as seen by the mock host.
#[derive(Debug, Clone, PartialEq)]
pub struct MockPrompt {
    pub session_id: String,
    pub text: String,
    pub constrained: bool,
    pub streaming: bool,
}

type Responder = Box<dyn Fn(&MockPrompt) -> MockReply + Send + Sync>;

#[derive(Default)]
struct Ledger {
    availability: VecDeque<Availability>,
    replies: VecDeque<MockReply>,
    prompts: Vec<MockPrompt>,
    appended: Vec<(String, Message)>,
    created: usize,
    destroyed: usize,
    downloads: usize,
    fail_clones: bool,
    fail_creates: bool,
}

struct Shared {
    ledger: Mutex<Ledger>,
    responder: Mutex<Option<Responder>>,
    quota: u64,
    next_id: AtomicU64,
}

impl Shared {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(self: &Arc<Self>, options: SessionOptions) -> SessionHandle {
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.ledger().created += 1;
        Box::new(MockSession {
            id,
            options,
            shared: self.clone(),
            used: 0,
            destroyed: false,
        })
    }

    fn reply_for(&self, prompt: MockPrompt) -> MockReply {
        let queued = {
            let mut ledger = self.ledger();
            ledger.prompts.push(prompt.clone());
            ledger.replies.pop_front()
        };
        if let Some(reply) = queued {
            return reply;
        }
        let responder = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match responder.as_ref() {
            Some(respond) => respond(&prompt),
            None => MockReply::Text(String::new()),
        }
    }
}

/// In-memory [`ModelHost`] with scripted replies.
#[derive(Clone)]
pub struct MockHost {
    shared: Arc<Shared>,
}

impl MockHost {
    /// Create an available host whose sessions hold up to 4096 tokens.
    pub fn new() -> Self {
        Self::with_quota(4096)
    }

    /// Create an available host with the given per-session quota.
    ///
    /// Every prompt consumes one token per input character.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(Ledger::default()),
                responder: Mutex::new(None),
                quota,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Report these states in order; the last one repeats.
    pub fn set_availability(&self, states: Vec<Availability>) {
        self.shared.ledger().availability = states.into();
    }

    /// Queue a reply for the next prompt on any session.
    pub fn queue_reply(&self, reply: MockReply) {
        self.shared.ledger().replies.push_back(reply);
    }

    /// Answer prompts that have no queued reply.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&MockPrompt) -> MockReply + Send + Sync + 'static,
    {
        *self
            .shared
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(responder));
    }

    /// Make `clone_session` fail on every session.
    pub fn fail_clones(&self, fail: bool) {
        self.shared.ledger().fail_clones = fail;
    }

    /// Make `create` fail.
    pub fn fail_creates(&self, fail: bool) {
        self.shared.ledger().fail_creates = fail;
    }

    /// Downloads requested so far.
    pub fn download_count(&self) -> usize {
        self.shared.ledger().downloads
    }

    /// Sessions opened so far, clones included.
    pub fn created_count(&self) -> usize {
        self.shared.ledger().created
    }

    /// Sessions destroyed so far.
    pub fn destroyed_count(&self) -> usize {
        self.shared.ledger().destroyed
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<MockPrompt> {
        self.shared.ledger().prompts.clone()
    }

    /// Every appended context message with the id of the receiving session.
    pub fn appended(&self) -> Vec<(String, Message)> {
        self.shared.ledger().appended.clone()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelHost for MockHost {
    fn name(&self) -> &str {
        "mock"
    }

    async fn availability(&self) -> Result<Availability> {
        let mut ledger = self.shared.ledger();
        let state = if ledger.availability.len() > 1 {
            ledger.availability.pop_front()
        } else {
            ledger.availability.front().copied()
        };
        Ok(state.unwrap_or(Availability::Available))
    }

    async fn download(&self) -> Result<()> {
        self.shared.ledger().downloads += 1;
        Ok(())
    }

    async fn create(&self, options: &SessionOptions) -> Result<SessionHandle> {
        if self.shared.ledger().fail_creates {
            return Err(Error::ProviderApi("mock create failure".to_string()));
        }
        Ok(self.shared.open(options.clone()))
    }
}

/// Session handed out by [`MockHost`].
pub struct MockSession {
    id: String,
    options: SessionOptions,
    shared: Arc<Shared>,
    used: u64,
    destroyed: bool,
}

impl MockSession {
    fn answer(&mut self, input: &str, constrained: bool, streaming: bool) -> MockReply {
        self.used = self.used.saturating_add(input.chars().count() as u64);
        self.shared.reply_for(MockPrompt {
            session_id: self.id.clone(),
            text: input.to_string(),
            constrained,
            streaming,
        })
    }
}

#[async_trait]
impl ModelSession for MockSession {
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
        match self.answer(input, constraint.is_some(), false) {
            MockReply::Text(text) => Ok(text),
            MockReply::Chunks(chunks) => Ok(chunks.concat()),
            MockReply::Fail(message) => Err(Error::ProviderApi(message)),
        }
    }

    async fn prompt_streaming(&mut self, input: &str) -> Result<ResponseStream> {
        let chunks = match self.answer(input, false, true) {
            MockReply::Text(text) => vec![text],
            MockReply::Chunks(chunks) => chunks,
            MockReply::Fail(message) => return Err(Error::ProviderApi(message)),
        };
        let items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
        Ok(Box::pin(tokio_stream::iter(items)))
    }

    async fn append(&mut self, messages: Vec<Message>) -> Result<()> {
        let mut ledger = self.shared.ledger();
        for message in messages {
            self.used = self
                .used
                .saturating_add(message.content.as_text().chars().count() as u64);
            ledger.appended.push((self.id.clone(), message));
        }
        Ok(())
    }

    async fn clone_session(&self) -> Result<SessionHandle> {
        if self.shared.ledger().fail_clones {
            return Err(Error::ProviderApi("mock clone failure".to_string()));
        }
        Ok(self.shared.open(self.options.clone()))
    }

    async fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.used = 0;
            self.shared.ledger().destroyed += 1;
        }
    }

    fn input_usage(&self) -> u64 {
        self.used
    }

    fn input_quota(&self) -> u64 {
        self.shared.quota
    }
}

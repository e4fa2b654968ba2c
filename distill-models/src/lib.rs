//! Model sessions for distill.
//!
//! This crate provides:
//! - The host contract ([`providers::ModelHost`], [`providers::ModelSession`])
//! - An Ollama-backed host for local models
//! - Session creation, readiness polling, streaming and schema-constrained
//!   prompting, and context reset
//! - A bounded pool that reuses idle sessions while they have budget left
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    SessionPool                       │
//! │   idle: [session, session, ...]  (LIFO, bounded)     │
//! └─────────────────────────────────────────────────────┘
//!                          │ checkout / release
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                  SessionManager                      │
//! │        validate options · check availability         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 dyn ModelHost                        │
//! │   ┌─────────────┐              ┌─────────────┐      │
//! │   │ OllamaHost  │              │  MockHost   │      │
//! │   └─────────────┘              └─────────────┘      │
//! └─────────────────────────────────────────────────────┘
//! ```

mod error;
mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod providers;
pub mod reply;
pub mod session;

pub use error::{Error, Result};
pub use providers::{ModelHost, ModelSession, ResponseStream, SessionHandle};
pub use session::{PoolConfig, SessionManager, SessionPool};
pub use types::{Availability, ContextUsage, SessionOptions};

//! Session management
//!
//! - [`SessionManager`] opens sessions and polls host readiness
//! - [`SessionPool`] keeps a bounded LIFO stack of idle sessions for reuse
//! - [`prompt_streaming`], [`prompt_constrained`], [`usage`] and
//!   [`reset_context`] operate on a session the caller owns

pub mod manager;
pub mod pool;
mod prompting;

pub use manager::SessionManager;
pub use pool::{PoolConfig, SessionPool};
pub use prompting::{prompt_constrained, prompt_streaming, reset_context, usage};

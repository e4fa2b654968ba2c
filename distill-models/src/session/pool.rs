//! Bounded pool of idle sessions.
//!
//! Sessions move in and out of the pool by value: `checkout` removes one from
//! the idle list and hands ownership to the caller, `release` takes it back.
//! A session is therefore either idle in the pool or held by exactly one
//! caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::manager::SessionManager;
use crate::providers::SessionHandle;
use crate::{Result, SessionOptions};

/// Pool sizing and reuse policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle sessions kept for reuse.
    pub capacity: usize,
    /// Idle sessions whose context usage is at or above this percentage are
    /// destroyed instead of reused.
    pub reuse_threshold_percent: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            reuse_threshold_percent: 80.0,
        }
    }
}

/// LIFO pool of idle sessions with a fixed capacity.
pub struct SessionPool {
    manager: Arc<SessionManager>,
    config: PoolConfig,
    idle: Mutex<Vec<SessionHandle>>,
}

impl SessionPool {
    /// Create an empty pool that opens new sessions through `manager`.
    pub fn new(manager: Arc<SessionManager>, config: PoolConfig) -> Self {
        let idle = Vec::with_capacity(config.capacity);
        Self {
            manager,
            config,
            idle: Mutex::new(idle),
        }
    }

    /// The manager used to open fresh sessions.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Take the most recently released session, or open a new one.
    ///
    /// A reused session keeps the options it was created with. An idle
    /// session at or above the reuse threshold is destroyed and replaced.
    pub async fn checkout(&self, options: &SessionOptions) -> Result<SessionHandle> {
        let candidate = self.idle.lock().await.pop();

        if let Some(mut session) = candidate {
            let usage = session.usage();
            if usage.percent_used < self.config.reuse_threshold_percent {
                debug!(
                    session = session.id(),
                    percent_used = usage.percent_used,
                    "Reusing pooled session"
                );
                return Ok(session);
            }
            debug!(
                session = session.id(),
                percent_used = usage.percent_used,
                "Pooled session over reuse threshold, replacing"
            );
            session.destroy().await;
        }

        self.manager.create_session(options).await
    }

    /// Return a session to the pool, destroying it if the pool is full.
    pub async fn release(&self, mut session: SessionHandle) {
        {
            let mut idle = self.idle.lock().await;
            if idle.len() < self.config.capacity {
                idle.push(session);
                return;
            }
        }
        debug!(
            session = session.id(),
            capacity = self.config.capacity,
            "Pool full, destroying session"
        );
        session.destroy().await;
    }

    /// Destroy every idle session. Checked-out sessions are unaffected.
    pub async fn destroy_all(&self) {
        let drained: Vec<SessionHandle> = self.idle.lock().await.drain(..).collect();
        for mut session in drained {
            session.destroy().await;
        }
    }

    /// Number of idle sessions.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

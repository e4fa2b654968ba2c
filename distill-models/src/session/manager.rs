//! SessionManager for creating model sessions
//!
//! SessionManager is the single entry point to the host runtime. It validates
//! session options, checks availability before opening a session, and polls
//! readiness while a model is still downloading.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::providers::{ModelHost, SessionHandle};
use crate::{Availability, Error, Result, SessionOptions};

/// Creates sessions against an optionally registered host.
#[derive(Clone, Default)]
pub struct SessionManager {
    host: Option<Arc<dyn ModelHost>>,
}

impl SessionManager {
    /// Create a manager bound to `host`.
    pub fn new(host: Arc<dyn ModelHost>) -> Self {
        Self { host: Some(host) }
    }

    /// Create a manager with no runtime registered.
    ///
    /// Every session request fails with [`Error::ServiceUnavailable`].
    pub fn unregistered() -> Self {
        Self::default()
    }

    /// Whether a host runtime is registered.
    pub fn is_registered(&self) -> bool {
        self.host.is_some()
    }

    fn host(&self) -> Result<&Arc<dyn ModelHost>> {
        self.host.as_ref().ok_or(Error::ServiceUnavailable)
    }

    /// Current availability as reported by the host.
    pub async fn availability(&self) -> Result<Availability> {
        self.host()?.availability().await
    }

    /// Open a new session.
    ///
    /// Fails with [`Error::ServiceUnavailable`] when no host is registered and
    /// [`Error::ModelUnavailable`] when the host reports the model unusable.
    pub async fn create_session(&self, options: &SessionOptions) -> Result<SessionHandle> {
        options.validate()?;
        let host = self.host()?;

        let availability = host.availability().await?;
        if availability == Availability::Unavailable {
            return Err(Error::ModelUnavailable(format!(
                "{} reports the model as unavailable",
                host.name()
            )));
        }

        let session = host.create(options).await?;
        debug!(
            host = host.name(),
            session = session.id(),
            %availability,
            "Created model session"
        );
        Ok(session)
    }

    /// Poll availability until the model is ready, unusable, or `timeout` elapses.
    ///
    /// A downloadable model is asked to download once. `on_progress` observes
    /// every polled state. Returns `true` only when the
    /// model became available; a timeout, a missing host, or a failed query
    /// all return `false`.
    pub async fn wait_until_ready<F>(
        &self,
        poll_interval: Duration,
        timeout: Duration,
        mut on_progress: F,
    ) -> bool
    where
        F: FnMut(Availability) + Send,
    {
        let Some(host) = self.host.as_ref() else {
            warn!("No model runtime registered; not waiting");
            return false;
        };

        let deadline = Instant::now() + timeout;
        let mut download_requested = false;
        loop {
            let state = match host.availability().await {
                Ok(state) => state,
                Err(e) => {
                    warn!(host = host.name(), error = %e, "Availability check failed");
                    return false;
                }
            };
            on_progress(state);

            match state {
                Availability::Available => {
                    info!(host = host.name(), "Model ready");
                    return true;
                }
                Availability::Unavailable => return false,
                Availability::Downloadable if !download_requested => {
                    download_requested = true;
                    if let Err(e) = host.download().await {
                        warn!(host = host.name(), error = %e, "Could not start model download");
                        return false;
                    }
                    info!(host = host.name(), "Started model download");
                }
                Availability::Downloadable | Availability::Downloading => {}
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(host = host.name(), %state, "Timed out waiting for model");
                return false;
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}

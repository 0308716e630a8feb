//! Handle for an asynchronous HMC operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;

use zhmc_core::Result;

use crate::session::Session;

/// An asynchronous HMC operation, identified by its job URI.
///
/// Returned by `post` calls when
/// [`PostOptions::no_wait`](crate::PostOptions::no_wait) is in effect.
/// Polled until the job status reaches one of `complete`,
/// `complete-with-error`, or `canceled`.
pub struct Job {
    session: Arc<Session>,
    uri: String,
    terminal: AtomicBool,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("uri", &self.uri)
            .field("terminal", &self.terminal.load(Ordering::Relaxed))
            .finish()
    }
}

impl Job {
    pub(crate) fn new(session: Arc<Session>, uri: impl Into<String>) -> Self {
        Self {
            session,
            uri: uri.into(),
            terminal: AtomicBool::new(false),
        }
    }

    /// The job URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether this handle has observed a terminal job status.
    pub fn is_known_terminal(&self) -> bool {
        self.terminal.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_terminal(&self) {
        self.terminal.store(true, Ordering::Relaxed);
    }

    /// One poll of the job status; the raw status response.
    pub async fn query_status(&self) -> Result<Value> {
        self.session.get(&self.uri).await
    }

    /// Poll the job until it reaches a terminal status; see
    /// [`Session::wait_for_completion`].
    pub async fn wait_for_completion(
        &self,
        operation_timeout: Option<Duration>,
    ) -> Result<Option<Value>> {
        self.session
            .wait_for_completion(self, operation_timeout)
            .await
    }
}

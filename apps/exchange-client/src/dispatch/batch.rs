//! Batch fan-out over the task pool with in-order fan-in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::request::{IntoRemoteRequest, RemoteRequest};
use crate::pool::{PoolError, TaskError, TaskHandle, TaskPool};
use crate::remote::{CallFailure, RemoteCall};

/// Why one batch item has no value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchItemError {
    /// The remote call failed.
    #[error(transparent)]
    Call(#[from] CallFailure),

    /// The task panicked or its slot was dropped.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The pool refused the submission.
    #[error("Submission rejected: {0}")]
    Rejected(#[from] PoolError),
}

/// Outcome of one batch item.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Position of the item in the input.
    pub index: usize,
    /// Endpoint the item called.
    pub endpoint: String,
    /// Response value or the reason there is none.
    pub outcome: Result<Value, BatchItemError>,
    /// Time spent executing the call on its worker.
    pub elapsed: Duration,
}

impl BatchEntry {
    /// Whether the item produced a value.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-item outcomes in input order, plus total wall time.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    entries: Vec<BatchEntry>,
    total_elapsed: Duration,
}

impl BatchResult {
    /// Number of entries; always the number of input items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in input order.
    #[must_use]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Entry for input index `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BatchEntry> {
        self.entries.get(index)
    }

    /// Count of items that produced a value.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_ok()).count()
    }

    /// Count of items that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Wall time from first submission to last collected result.
    #[must_use]
    pub const fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    /// Slowest single item.
    #[must_use]
    pub fn max_latency(&self) -> Duration {
        self.entries
            .iter()
            .map(|e| e.elapsed)
            .max()
            .unwrap_or_default()
    }

    /// Drop the metadata and keep only the outcomes, in input order.
    #[must_use]
    pub fn into_outcomes(self) -> Vec<Result<Value, BatchItemError>> {
        self.entries.into_iter().map(|e| e.outcome).collect()
    }
}

impl IntoIterator for BatchResult {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

type Timed = (Result<Value, CallFailure>, Duration);

/// Fans requests out over a [`TaskPool`] and collects results in order.
pub struct BatchDispatcher<C> {
    pool: Arc<TaskPool>,
    remote: Arc<C>,
}

impl<C> Clone for BatchDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<C: RemoteCall + 'static> BatchDispatcher<C> {
    /// Create a dispatcher over a shared pool and remote.
    #[must_use]
    pub const fn new(pool: Arc<TaskPool>, remote: Arc<C>) -> Self {
        Self { pool, remote }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    /// The remote collaborator.
    #[must_use]
    pub const fn remote(&self) -> &Arc<C> {
        &self.remote
    }

    /// Submit one request and return its handle.
    ///
    /// # Errors
    ///
    /// Returns `PoolStopped` after the pool began shutting down.
    pub fn submit<R: IntoRemoteRequest>(
        &self,
        token: Option<&str>,
        item: R,
    ) -> Result<TaskHandle<Result<Value, CallFailure>>, PoolError> {
        let remote = Arc::clone(&self.remote);
        let request = item.into_request();
        let token = token.filter(|_| request.is_authenticated()).map(str::to_string);

        self.pool.submit(move || {
            remote.invoke(request.endpoint(), request.params(), token.as_deref())
        })
    }

    /// Run every item concurrently and return outcomes in input order.
    ///
    /// Never fails as a whole: call failures, panics, and rejected
    /// submissions become error entries at their own index.
    ///
    /// Waits on each [`TaskHandle`](crate::pool::TaskHandle) with a blocking
    /// receive, so it must not run on an async worker thread.
    pub fn run_batch<I, R>(&self, token: Option<&str>, items: I) -> BatchResult
    where
        I: IntoIterator<Item = R>,
        R: IntoRemoteRequest,
    {
        let start = Instant::now();
        let token: Option<Arc<str>> = token.map(Arc::from);

        let pending: Vec<_> = items
            .into_iter()
            .map(|item| {
                let request = item.into_request();
                let endpoint = request.endpoint().to_string();
                (endpoint, self.submit_timed(request, token.clone()))
            })
            .collect();

        let entries: Vec<BatchEntry> = pending
            .into_iter()
            .enumerate()
            .map(|(index, (endpoint, submitted))| collect_entry(index, endpoint, submitted))
            .collect();

        let result = BatchResult {
            entries,
            total_elapsed: start.elapsed(),
        };

        info!(
            items = result.len(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            total_ms = result.total_elapsed.as_millis() as u64,
            max_latency_ms = result.max_latency().as_millis() as u64,
            "Batch complete"
        );

        result
    }

    fn submit_timed(
        &self,
        request: RemoteRequest,
        token: Option<Arc<str>>,
    ) -> Result<TaskHandle<Timed>, PoolError> {
        let remote = Arc::clone(&self.remote);
        let token = token.filter(|_| request.is_authenticated());

        self.pool.submit(move || {
            let started = Instant::now();
            let outcome = remote.invoke(request.endpoint(), request.params(), token.as_deref());
            (outcome, started.elapsed())
        })
    }
}

fn collect_entry(
    index: usize,
    endpoint: String,
    submitted: Result<TaskHandle<Timed>, PoolError>,
) -> BatchEntry {
    let (outcome, elapsed) = match submitted {
        Err(e) => (Err(BatchItemError::Rejected(e)), Duration::ZERO),
        Ok(handle) => match handle.wait() {
            Ok((Ok(value), elapsed)) => (Ok(value), elapsed),
            Ok((Err(failure), elapsed)) => (Err(failure.into()), elapsed),
            Err(e) => (Err(e.into()), Duration::ZERO),
        },
    };

    match &outcome {
        Ok(_) => debug!(
            index,
            endpoint = %endpoint,
            execution_time_ms = elapsed.as_millis() as u64,
            "Batch item completed"
        ),
        Err(e) => warn!(
            index,
            endpoint = %endpoint,
            error = %e,
            "Batch item failed"
        ),
    }

    BatchEntry {
        index,
        endpoint,
        outcome,
        elapsed,
    }
}

//! Error types for the task pool.

use thiserror::Error;

/// Errors returned by pool construction and submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A pool needs at least one worker.
    #[error("Task pool requires at least one worker")]
    NoWorkers,

    /// A worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {message}")]
    Spawn {
        /// Error message.
        message: String,
    },

    /// Submission after shutdown began.
    #[error("Task pool is stopped")]
    PoolStopped,
}

/// Failure delivered through a task handle instead of a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task panicked; the worker survived.
    #[error("Task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The result slot was dropped without a value.
    #[error("Task was cancelled before producing a result")]
    Cancelled,
}

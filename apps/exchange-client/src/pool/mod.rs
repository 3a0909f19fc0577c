//! Bounded-parallelism task pool.
//!
//! A fixed set of named OS worker threads drains one FIFO queue. Submission
//! never blocks and returns a [`TaskHandle`] that can be waited on or
//! awaited. Panics inside a task come back through the handle.

mod error;
mod executor;
mod handle;

pub use error::{PoolError, TaskError};
pub use executor::{PoolState, TaskPool};
pub use handle::TaskHandle;

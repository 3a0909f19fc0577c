//! Caller-side handle to a submitted task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use super::error::TaskError;

/// Future-like handle to the outcome of one submitted task.
///
/// Blocking callers use [`TaskHandle::wait`]; async callers `.await` the
/// handle directly. A task whose result slot is dropped unrun resolves as
/// [`TaskError::Cancelled`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) const fn new(rx: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { rx }
    }

    /// Block the current thread until the task finishes.
    ///
    /// Must not be called from inside an async runtime worker; use `.await`
    /// or run it under `spawn_blocking` there.
    pub fn wait(self) -> Result<T, TaskError> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(TaskError::Cancelled))
    }

    /// Take the outcome if the task already finished.
    ///
    /// Returns `None` while the task is still queued or running.
    pub fn try_take(&mut self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(TaskError::Cancelled)))
    }
}

//! Fixed worker pool over a condvar-guarded FIFO queue.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::error::{PoolError, TaskError};
use super::handle::TaskHandle;
use crate::error::panic_message;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a pool. `Running -> Draining` happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// Shutdown began; queued tasks finish, new ones are refused.
    Draining,
}

impl PoolState {
    /// Check if new tasks are accepted.
    #[must_use]
    pub const fn is_accepting(&self) -> bool {
        matches!(self, Self::Running)
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    state: PoolState,
}

struct Shared {
    queue: Mutex<QueueState>,
    /// Signalled when a job is queued or the pool starts draining.
    available: Condvar,
}

/// Fixed-size pool of worker threads with a shared FIFO queue.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl TaskPool {
    /// Spawn `worker_count` named worker threads.
    ///
    /// # Errors
    ///
    /// Returns `NoWorkers` for a zero count and `Spawn` if the OS refuses a
    /// thread; workers spawned before the failure are stopped and joined.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                state: PoolState::Running,
            }),
            available: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("task-pool-{index}"))
                .spawn(move || worker_loop(&worker_shared, index));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    let pool = Self {
                        shared,
                        workers: Mutex::new(workers),
                        worker_count: index,
                    };
                    pool.shutdown();
                    return Err(PoolError::Spawn {
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(workers = worker_count, "Task pool started");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    /// Queue a task and return its handle without blocking.
    ///
    /// # Errors
    ///
    /// Returns `PoolStopped` once shutdown has begun; nothing is queued.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                    TaskError::Panicked {
                        message: panic_message(payload.as_ref()),
                    }
                });
            // The caller may have dropped the handle.
            let _ = tx.send(outcome);
        });

        {
            let mut queue = self.shared.queue.lock();
            if !queue.state.is_accepting() {
                return Err(PoolError::PoolStopped);
            }
            queue.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle::new(rx))
    }

    /// Stop accepting work, let queued tasks finish, and join the workers.
    ///
    /// Idempotent. When called from a worker thread that worker is not
    /// joined; it exits on its own once the queue is empty.
    pub fn shutdown(&self) {
        let first = {
            let mut queue = self.shared.queue.lock();
            let first = queue.state.is_accepting();
            queue.state = PoolState::Draining;
            first
        };
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("Task pool worker terminated abnormally");
            }
        }

        if first {
            info!(workers = self.worker_count, "Task pool stopped");
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.shared.queue.lock().state
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("worker_count", &self.worker_count)
            .field("queued", &self.queued())
            .field("state", &self.state())
            .finish()
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    debug!(worker = index, "Worker started");
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            while queue.jobs.is_empty() && queue.state.is_accepting() {
                shared.available.wait(&mut queue);
            }
            match queue.jobs.pop_front() {
                Some(job) => job,
                None => break,
            }
        };
        job();
    }
    debug!(worker = index, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_zero_workers_rejected() {
        assert_eq!(TaskPool::new(0).unwrap_err(), PoolError::NoWorkers);
    }

    #[test]
    fn test_submit_returns_value() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.wait(), Ok(42));
        assert_eq!(pool.worker_count(), 2);
        assert_eq!(pool.state(), PoolState::Running);
    }

    #[test]
    fn test_panic_is_contained_and_worker_survives() {
        let pool = TaskPool::new(1).unwrap();

        let failing = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
        let Err(TaskError::Panicked { message }) = failing.wait() else {
            panic!("expected panicked task");
        };
        assert_eq!(message, "boom");

        // Same single worker keeps serving.
        let ok = pool.submit(|| 5_u32).unwrap();
        assert_eq!(ok.wait(), Ok(5));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = TaskPool::new(2).unwrap();
        pool.shutdown();

        assert_eq!(pool.state(), PoolState::Draining);
        assert_eq!(pool.submit(|| ()).unwrap_err(), PoolError::PoolStopped);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = TaskPool::new(3).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.state(), PoolState::Draining);
    }

    #[test]
    fn test_queued_tasks_drain_on_shutdown() {
        let pool = TaskPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let done = Arc::clone(&done);
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 10);
        for handle in handles {
            assert_eq!(handle.wait(), Ok(()));
        }
    }

    #[test]
    fn test_concurrency_never_exceeds_worker_count() {
        let pool = TaskPool::new(3).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                pool.submit(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.wait().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_tasks_run_in_parallel() {
        let pool = TaskPool::new(4).unwrap();
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| pool.submit(|| thread::sleep(Duration::from_millis(50))).unwrap())
            .collect();
        for handle in handles {
            handle.wait().unwrap();
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[test]
    fn test_shutdown_from_inside_task() {
        let pool = Arc::new(TaskPool::new(2).unwrap());
        let inner = Arc::clone(&pool);

        let handle = pool.submit(move || inner.shutdown()).unwrap();
        assert_eq!(handle.wait(), Ok(()));
        assert_eq!(pool.state(), PoolState::Draining);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_await_handle_from_async_context() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(|| "ready").unwrap();
        assert_eq!(handle.await, Ok("ready"));
    }
}

//! Bounded fan-out with error accumulation.
//!
//! Jobs run on their own tokio tasks, at most `size` at a time. Submitting
//! never waits for a free slot: the permit is taken inside the spawned task.
//! Failures are collected under a mutex and handed back by
//! [`WorkerPool::close`], so one failing job never stops the others.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Pool running fallible jobs with bounded concurrency.
pub struct WorkerPool<E> {
    slots: Arc<Semaphore>,
    tasks: JoinSet<()>,
    errors: Arc<Mutex<Vec<E>>>,
}

impl<E: Send + 'static> WorkerPool<E> {
    /// Creates a pool running at most `size` jobs at once; a size of zero
    /// is treated as one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Schedules a job. Must be called from within a tokio runtime.
    pub fn submit<F>(&mut self, job: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let errors = Arc::clone(&self.errors);
        self.tasks.spawn(async move {
            let _permit = slots.acquire_owned().await.ok();
            if let Err(err) = job.await {
                errors.lock().await.push(err);
            }
        });
    }

    /// Number of jobs not yet collected.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every job and returns the accumulated failures in
    /// completion order.
    pub async fn close(mut self) -> Vec<E> {
        let mut joined = 0_usize;
        while let Some(outcome) = self.tasks.join_next().await {
            joined = joined.saturating_add(1);
            if let Err(err) = outcome {
                error!(error = %err, "worker task did not complete");
            }
        }
        let errors = std::mem::take(&mut *self.errors.lock().await);
        debug!(jobs = joined, failures = errors.len(), "worker pool drained");
        errors
    }
}

#[cfg(test)]
mod tests;

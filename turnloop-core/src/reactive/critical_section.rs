//! Async serializer
//!
//! Jobs handed to [`CriticalSection::enter`] run strictly one after another, in the
//! order `enter` was called, on a worker task spawned with the first job.

use crate::error::TurnError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = BoxFuture<'static, ()>;

/// Runs async jobs one at a time in FIFO order
#[derive(Debug, Default)]
pub struct CriticalSection {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl CriticalSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `job` and return a future for its outcome.
    ///
    /// The job is queued when `enter` is called, not when the returned future is
    /// polled; dropping the future does not cancel the job. A job that fails or
    /// panics only affects its own outcome.
    pub fn enter<F, Fut, T>(&self, job: F) -> impl Future<Output = Result<T, TurnError>> + Send
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TurnError>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let wrapped: Job = Box::pin(async move {
            let result = match AssertUnwindSafe(async move { job().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TurnError::other("job panicked")),
            };
            // Nobody is waiting if the caller dropped its future.
            let _ = reply.send(result);
        });

        let queued = self.enqueue(wrapped);

        async move {
            if !queued {
                return Err(TurnError::Closed);
            }
            outcome.await.unwrap_or(Err(TurnError::Closed))
        }
    }

    fn enqueue(&self, job: Job) -> bool {
        let mut sender = self.sender();
        let job = match sender.as_ref() {
            Some(existing) => match existing.send(job) {
                Ok(()) => return true,
                // Worker gone (runtime shut down); start a fresh one.
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (worker, jobs) = mpsc::unbounded_channel();
        let queued = worker.send(job).is_ok();
        *sender = Some(worker);
        drop(sender);

        spawn_worker(jobs);
        queued
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Job>>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn spawn_worker(mut jobs: mpsc::UnboundedReceiver<Job>) {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            job.await;
        }
        debug!("Critical section worker stopped");
    });
}

//! Bounded worker pool for detail resolutions
//!
//! Jobs are admitted strictly in submission order by a single dispatcher
//! task. A slot is a semaphore permit; it is held for the job's duration
//! plus the spacing delay, which caps the request rate independently of
//! the pool width.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Failure of a pooled task as seen by its submitter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("task aborted before producing a result")]
    TaskAborted,
}

/// Handle to the eventual result of a submitted task
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task to finish
    pub async fn join(self) -> Result<T, PoolError> {
        self.receiver.await.map_err(|_| PoolError::TaskAborted)
    }
}

/// Fixed-width pool running futures with FIFO admission
pub struct WorkerPool {
    jobs: mpsc::UnboundedSender<Job>,
    width: usize,
}

impl WorkerPool {
    /// Creates a pool; must be called from within a tokio runtime
    ///
    /// # Arguments
    ///
    /// * `width` - Maximum number of tasks running at once (at least 1)
    /// * `spacing` - How long a slot stays taken after its task completes
    pub fn new(width: usize, spacing: Duration) -> Self {
        let width = width.max(1);
        let (jobs, receiver) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(receiver, Arc::new(Semaphore::new(width)), spacing));

        Self { jobs, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Queues a task
    ///
    /// A task that panics is isolated: its handle reports
    /// `PoolError::TaskAborted` and sibling tasks are unaffected.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let _ = sender.send(task.await);
        });

        if self.jobs.send(job).is_err() {
            tracing::error!("Worker pool dispatcher is gone, task dropped");
        }

        TaskHandle { receiver }
    }

    /// Waits for every handle, preserving submission order in the results
    pub async fn join_all<T>(handles: Vec<TaskHandle<T>>) -> Vec<Result<T, PoolError>> {
        futures::future::join_all(handles.into_iter().map(TaskHandle::join)).await
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    slots: Arc<Semaphore>,
    spacing: Duration,
) {
    while let Some(job) = receiver.recv().await {
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        tracing::debug!(
            available = slots.available_permits(),
            "Admitting pooled task"
        );

        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(job).await {
                tracing::error!("Pooled task aborted: {}", e);
            }
            tokio::time::sleep(spacing).await;
            drop(permit);
        });
    }
}

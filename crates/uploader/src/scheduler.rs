//! Concurrency scheduler.
//!
//! Transfers are admitted in fixed batches of `min(remaining, limit)`; a
//! batch runs concurrently and is awaited as a whole before the next one is
//! admitted. Independently of batching, every transfer holds a slot of an
//! engine-wide semaphore while it is uploading, so concurrent batches and
//! resumed transfers share one upper bound.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::UploadError;

pub(crate) struct Scheduler {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl Scheduler {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a free upload slot.
    ///
    /// The permit is the slot: dropping it on any exit path releases it.
    pub(crate) async fn admit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, UploadError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| UploadError::Cancelled)
            }
        }
    }

    /// Runs `task` for every item in batches of `batch_size`.
    ///
    /// Results come back in input order. A panicking task yields its
    /// `JoinError` without disturbing its siblings.
    pub(crate) async fn run_batches<I, T, F, Fut>(
        items: &[I],
        batch_size: usize,
        task: F,
    ) -> Vec<Result<T, JoinError>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(items.len());

        for (n, batch) in items.chunks(batch_size).enumerate() {
            debug!(batch = n, size = batch.len(), "batch admitted");
            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|item| tokio::spawn(task(item)))
                .collect();
            for handle in handles {
                results.push(handle.await);
            }
            debug!(batch = n, "batch settled");
        }
        results
    }
}

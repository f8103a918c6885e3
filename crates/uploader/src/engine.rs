//! Transfer engine facade.
//!
//! Validates and registers submitted files, drives them through the
//! scheduler to the direct or chunked path, and exposes lifecycle calls
//! and queries over the registry. Results are published on a broadcast
//! channel and returned as [`TransferOutcome`]s.

use std::sync::Arc;

use ferry_transfer::{
    AggregateProgress, AttachmentKind, SourceFile, TransferConfig, TransferError, TransferOptions,
    TransferProgress, TransferStatus, validate_batch,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::api::RemoteTransferApi;
use crate::chunked::upload_chunked;
use crate::direct::upload_direct;
use crate::error::{LifecycleError, UploadError};
use crate::registry::{Registry, Run};
use crate::scheduler::Scheduler;
use crate::types::{
    BatchReport, Rejection, Submission, TransferEvent, TransferId, TransferOutcome,
};

/// Resumable, chunked file-transfer engine.
///
/// Cloning is cheap; clones share the registry, the concurrency slots and
/// the event channel.
#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn RemoteTransferApi>,
    config: TransferConfig,
    registry: Registry,
    scheduler: Scheduler,
    events: broadcast::Sender<TransferEvent>,
}

impl TransferEngine {
    /// Creates an engine with process-wide defaults.
    pub fn new(api: Arc<dyn RemoteTransferApi>, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            inner: Arc::new(Inner {
                api,
                scheduler: Scheduler::new(config.max_concurrent_uploads),
                registry: Registry::new(),
                config,
                events,
            }),
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.inner.config
    }

    /// Subscribes to transfer events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.inner.events.subscribe()
    }

    /// Validates `files` and registers the accepted ones as pending.
    ///
    /// Rejected files never enter the registry. Fails only when `options`
    /// override the configuration with invalid values.
    pub fn submit(
        &self,
        files: Vec<SourceFile>,
        options: &TransferOptions,
    ) -> Result<Submission, TransferError> {
        let config = self.inner.config.with_overrides(options)?;
        let batch = validate_batch(&files, &config);
        let mut submission = Submission::default();

        for (file, result) in files.into_iter().zip(batch.results) {
            submission
                .warnings
                .extend(result.warnings.iter().map(|w| format!("{}: {w}", file.name)));

            if !result.is_valid {
                warn!(file = %file.name, errors = ?result.errors, "file rejected");
                submission.rejected.push(Rejection {
                    file_name: file.name,
                    errors: result.errors,
                });
                continue;
            }

            let mut metadata = options.metadata.clone();
            if metadata.category.is_none() {
                metadata.category = Some(AttachmentKind::from_filename(&file.name).as_str().to_string());
            }

            let progress = self.inner.registry.insert(file, config.clone(), metadata);
            let _ = self.inner.events.send(TransferEvent::Queued {
                id: progress.id.clone(),
                file_name: progress.file_name.clone(),
                total_bytes: progress.total_bytes,
            });
            submission.accepted.push(progress.id);
        }

        if !batch.warnings.is_empty() {
            warn!(total_bytes = batch.total_size, "batch exceeds the aggregate size limit");
        }
        submission.warnings.extend(batch.warnings);
        Ok(submission)
    }

    /// Runs pending transfers in batches of the engine's concurrency limit.
    ///
    /// Ids that are unknown or no longer pending yield an outcome describing
    /// their current state, or are skipped when unknown.
    pub async fn run(&self, ids: &[TransferId]) -> Vec<TransferOutcome> {
        self.run_with_limit(ids, self.inner.scheduler.limit()).await
    }

    async fn run_with_limit(&self, ids: &[TransferId], limit: usize) -> Vec<TransferOutcome> {
        let mut runs = Vec::with_capacity(ids.len());
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.inner.registry.first_run(id) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    warn!(transfer = %id, error = %e, "transfer not runnable");
                    if let Some(progress) = self.inner.registry.get(id) {
                        outcomes.push(TransferOutcome::from_progress(&progress));
                    }
                }
            }
        }

        let results = Scheduler::run_batches(&runs, limit, |run| {
            let inner = Arc::clone(&self.inner);
            async move { inner.execute(run).await }
        })
        .await;

        for (run, result) in runs.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(transfer = %run.id, error = %e, "transfer task failed");
                    let finished = run.finish(Err(UploadError::Transport(format!(
                        "transfer task failed: {e}"
                    ))));
                    outcomes.push(TransferOutcome::from_progress(&finished.progress));
                }
            }
        }
        outcomes
    }

    /// Validates, registers and runs `files`.
    pub async fn upload_files(
        &self,
        files: Vec<SourceFile>,
        options: &TransferOptions,
    ) -> Result<BatchReport, TransferError> {
        let limit = options
            .max_concurrent_uploads
            .unwrap_or(self.inner.config.max_concurrent_uploads);
        let submission = self.submit(files, options)?;
        let outcomes = self.run_with_limit(&submission.accepted, limit).await;

        let report = BatchReport {
            outcomes,
            rejected: submission.rejected,
            warnings: submission.warnings,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            rejected = report.rejected.len(),
            "batch finished"
        );
        Ok(report)
    }

    /// Uploads one file.
    ///
    /// Returns `UploadError::Validation` when the file is rejected and
    /// `UploadError::InvalidOptions` when `options` are invalid; any later
    /// failure is reported through the outcome's status.
    pub async fn upload_file(
        &self,
        file: SourceFile,
        options: &TransferOptions,
    ) -> Result<TransferOutcome, UploadError> {
        let submission = self
            .submit(vec![file], options)
            .map_err(|e| UploadError::InvalidOptions(e.to_string()))?;

        if let Some(rejection) = submission.rejected.into_iter().next() {
            return Err(UploadError::Validation(rejection.errors));
        }
        let outcome = self
            .run(&submission.accepted)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::Protocol("transfer vanished before it ran".into()))?;
        Ok(outcome)
    }

    /// Pauses an uploading transfer.
    pub fn pause(&self, id: &str) -> Result<(), LifecycleError> {
        let progress = self.inner.registry.pause(id)?;
        info!(transfer = %id, bytes = progress.bytes_transferred, "transfer paused");
        let _ = self.inner.events.send(TransferEvent::Paused { id: id.to_string() });
        Ok(())
    }

    /// Runs a paused or failed transfer again from byte zero.
    ///
    /// Waits for a free slot under the engine-wide concurrency limit and
    /// resolves when this run ends.
    pub async fn resume(&self, id: &str) -> Result<TransferOutcome, LifecycleError> {
        let run = self.inner.registry.resume(id)?;
        if let Some(progress) = self.inner.registry.get(id) {
            let _ = self.inner.events.send(TransferEvent::Queued {
                id: progress.id,
                file_name: progress.file_name,
                total_bytes: progress.total_bytes,
            });
        }
        info!(transfer = %id, "transfer resumed");
        Ok(Arc::clone(&self.inner).execute(run).await)
    }

    /// Cancels a pending, uploading or paused transfer.
    pub fn cancel(&self, id: &str) -> Result<(), LifecycleError> {
        self.inner.registry.cancel(id)?;
        info!(transfer = %id, "transfer cancelled");
        let _ = self.inner.events.send(TransferEvent::Cancelled { id: id.to_string() });
        Ok(())
    }

    /// Removes a transfer from the registry. Refused while uploading.
    pub fn remove(&self, id: &str) -> Result<TransferProgress, LifecycleError> {
        self.inner.registry.remove(id)
    }

    /// Removes every completed, failed and cancelled transfer.
    pub fn clear_completed(&self) -> usize {
        let removed = self.inner.registry.clear_completed();
        if removed > 0 {
            info!(removed, "cleared finished transfers");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<TransferProgress> {
        self.inner.registry.get(id)
    }

    /// Every registered transfer, in submission order.
    pub fn snapshot(&self) -> Vec<TransferProgress> {
        self.inner.registry.snapshot()
    }

    /// Aggregate over every registered transfer, recomputed on each call.
    pub fn total_progress(&self) -> AggregateProgress {
        self.inner.registry.aggregate()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    /// One run of one transfer: wait for a slot, route by size, record
    /// the result.
    async fn execute(self: Arc<Self>, run: Run) -> TransferOutcome {
        let Ok(_permit) = self.scheduler.admit(&run.cancel).await else {
            return run.outcome();
        };
        let Some(started) = run.start() else {
            return run.outcome();
        };

        let chunked = run.config().requires_chunking(started.total_bytes);
        info!(
            transfer = %run.id,
            file = %started.file_name,
            bytes = started.total_bytes,
            chunked,
            "transfer started"
        );
        let _ = self.events.send(TransferEvent::Progress {
            id: run.id.clone(),
            progress: started,
        });

        let result = if chunked {
            upload_chunked(self.api.as_ref(), &run, &self.events).await
        } else {
            upload_direct(self.api.as_ref(), &run, &self.events).await
        };

        let finished = run.finish(result);
        if finished.applied {
            self.publish_terminal(&finished.progress);
        }
        TransferOutcome::from_progress(&finished.progress)
    }

    fn publish_terminal(&self, progress: &TransferProgress) {
        let id = progress.id.clone();
        let event = match progress.status {
            TransferStatus::Completed => {
                info!(
                    transfer = %id,
                    locator = progress.locator.as_deref().unwrap_or_default(),
                    "transfer completed"
                );
                match &progress.record {
                    Some(record) => TransferEvent::Completed {
                        id,
                        record: record.clone(),
                    },
                    None => return,
                }
            }
            TransferStatus::Error => {
                let error = progress.error.clone().unwrap_or_default();
                error!(transfer = %id, error = %error, "transfer failed");
                TransferEvent::Failed { id, error }
            }
            TransferStatus::Cancelled => TransferEvent::Cancelled { id },
            _ => return,
        };
        let _ = self.events.send(event);
    }
}

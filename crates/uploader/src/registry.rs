//! Transfer registry: the authoritative map of transfer id to progress.
//!
//! Each entry owns its `TransferProgress`, the source payload and the
//! effective configuration it was submitted with. A run of a transfer is
//! represented by a [`Run`] handle carrying a generation number; updates
//! from a run superseded by `resume` are ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use ferry_protocol::{TransferRecord, UploadMetadata};
use ferry_transfer::{
    AggregateProgress, SourceFile, TransferConfig, TransferProgress, TransferStatus,
};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{LifecycleError, UploadError};
use crate::types::{TransferId, TransferOutcome};

pub(crate) struct Entry {
    seq: u64,
    pub(crate) file: SourceFile,
    pub(crate) config: TransferConfig,
    pub(crate) metadata: UploadMetadata,
    state: RwLock<EntryState>,
}

struct EntryState {
    progress: TransferProgress,
    generation: u64,
    cancel: CancellationToken,
}

/// Handle on one run of a transfer.
#[derive(Clone)]
pub(crate) struct Run {
    pub(crate) id: TransferId,
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    entry: Arc<Entry>,
}

/// What `Run::finish` did with the result.
pub(crate) struct Finished {
    pub(crate) progress: TransferProgress,
    /// False when a lifecycle call (pause, cancel) or a newer run already
    /// owns the record.
    pub(crate) applied: bool,
}

impl Run {
    pub(crate) fn file(&self) -> &SourceFile {
        &self.entry.file
    }

    pub(crate) fn config(&self) -> &TransferConfig {
        &self.entry.config
    }

    pub(crate) fn metadata(&self) -> &UploadMetadata {
        &self.entry.metadata
    }

    /// Moves the transfer into `uploading`.
    ///
    /// Returns `None` when the transfer was cancelled or removed while
    /// queued, or when this run has been superseded.
    pub(crate) fn start(&self) -> Option<TransferProgress> {
        let mut state = self.entry.state.write();
        if state.generation != self.generation || self.cancel.is_cancelled() {
            return None;
        }
        if !state.progress.status.can_transition_to(TransferStatus::Uploading) {
            return None;
        }
        state.progress.start(Utc::now());
        Some(state.progress.clone())
    }

    /// Applies `f` while this run still owns an uploading record.
    pub(crate) fn update(
        &self,
        f: impl FnOnce(&mut TransferProgress),
    ) -> Option<TransferProgress> {
        let mut state = self.entry.state.write();
        if state.generation != self.generation
            || state.progress.status != TransferStatus::Uploading
        {
            return None;
        }
        f(&mut state.progress);
        Some(state.progress.clone())
    }

    /// Records the terminal result of this run.
    pub(crate) fn finish(&self, result: Result<TransferRecord, UploadError>) -> Finished {
        let mut state = self.entry.state.write();
        let current = state.generation == self.generation
            && state.progress.status == TransferStatus::Uploading;

        if !current {
            let mut progress = state.progress.clone();
            if state.generation != self.generation {
                progress.status = TransferStatus::Paused;
            }
            return Finished {
                progress,
                applied: false,
            };
        }

        let now = Utc::now();
        match result {
            Ok(record) => state.progress.complete(record, now),
            Err(UploadError::Cancelled) => state.progress.cancel(now),
            Err(e) => state.progress.fail(&e.to_string(), now),
        }
        Finished {
            progress: state.progress.clone(),
            applied: true,
        }
    }

    /// Outcome reflecting the record as it stands now.
    pub(crate) fn outcome(&self) -> TransferOutcome {
        TransferOutcome::from_progress(&self.entry.state.read().progress)
    }
}

pub(crate) struct Registry {
    entries: DashMap<TransferId, Arc<Entry>>,
    next_seq: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a validated file as a pending transfer.
    pub(crate) fn insert(
        &self,
        file: SourceFile,
        config: TransferConfig,
        metadata: UploadMetadata,
    ) -> TransferProgress {
        let id = uuid::Uuid::new_v4().to_string();
        let progress = TransferProgress::new(id.clone(), &file);
        let entry = Arc::new(Entry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            file,
            config,
            metadata,
            state: RwLock::new(EntryState {
                progress: progress.clone(),
                generation: 0,
                cancel: CancellationToken::new(),
            }),
        });
        self.entries.insert(id, entry);
        progress
    }

    fn entry(&self, id: &str) -> Result<Arc<Entry>, LifecycleError> {
        self.entries
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    pub(crate) fn get(&self, id: &str) -> Option<TransferProgress> {
        let entry = self.entries.get(id).map(|e| Arc::clone(e.value()))?;
        let progress = entry.state.read().progress.clone();
        Some(progress)
    }

    /// Every record, in submission order.
    pub(crate) fn snapshot(&self) -> Vec<TransferProgress> {
        let mut entries: Vec<Arc<Entry>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .iter()
            .map(|e| e.state.read().progress.clone())
            .collect()
    }

    pub(crate) fn aggregate(&self) -> AggregateProgress {
        AggregateProgress::from_records(&self.snapshot())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Hands out the first run of a pending transfer.
    pub(crate) fn first_run(&self, id: &str) -> Result<Run, LifecycleError> {
        let entry = self.entry(id)?;
        let state = entry.state.read();
        if state.progress.status != TransferStatus::Pending {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: state.progress.status,
                action: "start",
            });
        }
        let run = Run {
            id: id.to_string(),
            generation: state.generation,
            cancel: state.cancel.clone(),
            entry: Arc::clone(&entry),
        };
        drop(state);
        Ok(run)
    }

    /// Pauses an uploading transfer and signals its run to stop.
    pub(crate) fn pause(&self, id: &str) -> Result<TransferProgress, LifecycleError> {
        let entry = self.entry(id)?;
        let mut state = entry.state.write();
        if state.progress.status != TransferStatus::Uploading {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: state.progress.status,
                action: "pause",
            });
        }
        state.progress.pause();
        state.cancel.cancel();
        Ok(state.progress.clone())
    }

    /// Resets a paused or failed transfer and hands out a fresh run.
    ///
    /// Byte accounting restarts from zero.
    pub(crate) fn resume(&self, id: &str) -> Result<Run, LifecycleError> {
        let entry = self.entry(id)?;
        let mut state = entry.state.write();
        if !matches!(
            state.progress.status,
            TransferStatus::Paused | TransferStatus::Error
        ) {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: state.progress.status,
                action: "resume",
            });
        }
        state.progress.reset_for_resume();
        state.generation += 1;
        state.cancel = CancellationToken::new();
        let run = Run {
            id: id.to_string(),
            generation: state.generation,
            cancel: state.cancel.clone(),
            entry: Arc::clone(&entry),
        };
        drop(state);
        Ok(run)
    }

    /// Cancels a non-terminal transfer.
    pub(crate) fn cancel(&self, id: &str) -> Result<TransferProgress, LifecycleError> {
        let entry = self.entry(id)?;
        let mut state = entry.state.write();
        if state.progress.status.is_terminal() {
            return Err(LifecycleError::InvalidState {
                id: id.to_string(),
                status: state.progress.status,
                action: "cancel",
            });
        }
        state.progress.cancel(Utc::now());
        state.cancel.cancel();
        Ok(state.progress.clone())
    }

    /// Detaches a record. Refused while the transfer is uploading.
    ///
    /// A pending or paused transfer is cancelled on the way out so a queued
    /// run never starts.
    pub(crate) fn remove(&self, id: &str) -> Result<TransferProgress, LifecycleError> {
        let entry = self.entry(id)?;
        let progress = {
            let mut state = entry.state.write();
            if state.progress.status == TransferStatus::Uploading {
                return Err(LifecycleError::StillUploading(id.to_string()));
            }
            if !state.progress.status.is_terminal() {
                state.progress.cancel(Utc::now());
                state.cancel.cancel();
            }
            state.progress.clone()
        };
        self.entries.remove(id);
        Ok(progress)
    }

    /// Removes every completed, failed and cancelled record.
    pub(crate) fn clear_completed(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.state.read().progress.status.is_terminal());
        before.saturating_sub(self.entries.len())
    }
}

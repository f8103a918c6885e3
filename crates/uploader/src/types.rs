use ferry_protocol::TransferRecord;
use ferry_transfer::{TransferProgress, TransferStatus};
use serde::{Deserialize, Serialize};

/// Opaque, unique id of one submitted transfer.
pub type TransferId = String;

/// Events published on the engine's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransferEvent {
    /// A file passed validation and was registered.
    Queued {
        id: TransferId,
        file_name: String,
        total_bytes: u64,
    },
    /// Byte or chunk progress.
    Progress {
        id: TransferId,
        progress: TransferProgress,
    },
    Paused {
        id: TransferId,
    },
    Completed {
        id: TransferId,
        record: TransferRecord,
    },
    Failed {
        id: TransferId,
        error: String,
    },
    Cancelled {
        id: TransferId,
    },
}

impl TransferEvent {
    /// Id of the transfer the event is about.
    pub fn id(&self) -> &str {
        match self {
            Self::Queued { id, .. }
            | Self::Progress { id, .. }
            | Self::Paused { id }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => id,
        }
    }
}

/// Final state of one run of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub id: TransferId,
    pub file_name: String,
    /// `completed`, `error`, `cancelled`, or `paused` when the run was paused.
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<TransferRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferOutcome {
    pub(crate) fn from_progress(progress: &TransferProgress) -> Self {
        Self {
            id: progress.id.clone(),
            file_name: progress.file_name.clone(),
            status: progress.status,
            record: progress.record.clone(),
            error: progress.error.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// A file refused by the validator. Never enters the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub file_name: String,
    pub errors: Vec<String>,
}

/// Result of registering a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Registered transfer ids, in input order.
    pub accepted: Vec<TransferId>,
    pub rejected: Vec<Rejection>,
    /// Per-file and batch-level warnings.
    pub warnings: Vec<String>,
}

/// Result of submitting and running a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<TransferOutcome>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == TransferStatus::Error)
            .count()
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferry_protocol::TransferRecord;
use serde::{Deserialize, Serialize};

use crate::content::guess_content_type;
use crate::progress::Throughput;

/// A payload submitted for transfer.
///
/// The bytes are shared, so cloning is cheap and chunk slicing never
/// copies the whole file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    pub data: Arc<[u8]>,
}

impl SourceFile {
    /// Creates a source file, guessing the content type from the name.
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let content_type = guess_content_type(&name)
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            name,
            content_type,
            data: data.into(),
        }
    }

    /// Overrides the guessed content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Reads a file from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, data))
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Lifecycle state of a transfer.
///
/// `pending → uploading → {completed, error, cancelled}`, with
/// `uploading → paused → {uploading, cancelled}`. `error` re-enters
/// `pending` only through an explicit resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Uploading,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TransferStatus {
    /// Completed, failed and cancelled transfers never run again on their own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Returns true if the state machine allows `self → next`.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Cancelled)
                | (Uploading, Completed)
                | (Uploading, Error)
                | (Uploading, Cancelled)
                | (Uploading, Paused)
                | (Paused, Uploading)
                | (Paused, Cancelled)
                | (Error, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-transfer progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub status: TransferStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Bytes per second since `started_at`.
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Index of the last acknowledged chunk plus one (chunked path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<TransferRecord>,
}

impl TransferProgress {
    /// Creates a pending record for a submitted file.
    pub fn new(id: String, file: &SourceFile) -> Self {
        Self {
            id,
            file_name: file.name.clone(),
            content_type: file.content_type.clone(),
            status: TransferStatus::Pending,
            progress: 0.0,
            bytes_transferred: 0,
            total_bytes: file.size(),
            speed: 0.0,
            eta_seconds: None,
            error: None,
            current_chunk: None,
            total_chunks: None,
            started_at: None,
            ended_at: None,
            locator: None,
            record: None,
        }
    }

    /// Moves to `uploading` and stamps the start time.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TransferStatus::Uploading;
        self.started_at = Some(now);
        self.ended_at = None;
    }

    /// Records that `bytes` have been sent in total.
    ///
    /// Clamped to `total_bytes` and never lowers the counter, so a retried
    /// request re-reporting early offsets does not move progress backwards.
    pub fn record_bytes(&mut self, bytes: u64, now: DateTime<Utc>) {
        let bytes = bytes.min(self.total_bytes);
        if bytes > self.bytes_transferred {
            self.bytes_transferred = bytes;
        }
        self.progress = percentage(self.bytes_transferred, self.total_bytes);

        let elapsed = self
            .started_at
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or(Duration::ZERO);
        let rate = Throughput::measure(
            self.bytes_transferred,
            self.total_bytes - self.bytes_transferred,
            elapsed,
        );
        self.speed = rate.bytes_per_second;
        self.eta_seconds = rate.eta_seconds;
    }

    /// Records chunk acknowledgement position.
    pub fn record_chunk(&mut self, acknowledged: u32, total: u32) {
        self.current_chunk = Some(acknowledged);
        self.total_chunks = Some(total);
    }

    /// Marks the transfer completed with its remote record.
    pub fn complete(&mut self, record: TransferRecord, now: DateTime<Utc>) {
        self.record_bytes(self.total_bytes, now);
        self.status = TransferStatus::Completed;
        self.progress = 100.0;
        self.eta_seconds = Some(0.0);
        self.locator = Some(record.locator().to_string());
        self.record = Some(record);
        self.ended_at = Some(now);
    }

    /// Marks the transfer failed.
    pub fn fail(&mut self, error: &str, now: DateTime<Utc>) {
        self.status = TransferStatus::Error;
        self.error = Some(error.to_string());
        self.eta_seconds = None;
        self.ended_at = Some(now);
    }

    /// Marks the transfer cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = TransferStatus::Cancelled;
        self.eta_seconds = None;
        self.ended_at = Some(now);
    }

    /// Marks the transfer paused.
    pub fn pause(&mut self) {
        self.status = TransferStatus::Paused;
        self.speed = 0.0;
        self.eta_seconds = None;
    }

    /// Clears byte accounting so the transfer can run again from byte zero.
    ///
    /// From `error` the status returns to `pending`; a paused transfer stays
    /// paused until it is admitted again.
    pub fn reset_for_resume(&mut self) {
        if self.status == TransferStatus::Error {
            self.status = TransferStatus::Pending;
        }
        self.progress = 0.0;
        self.bytes_transferred = 0;
        self.speed = 0.0;
        self.eta_seconds = None;
        self.error = None;
        self.current_chunk = None;
        self.total_chunks = None;
        self.started_at = None;
        self.ended_at = None;
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes - self.bytes_transferred
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

/// Server-side session of one chunked transfer.
///
/// Owned by the chunked path for the duration of a single run and dropped
/// on completion or abort.
#[derive(Debug, Clone)]
pub struct TransferSession {
    session_id: String,
    acknowledged: Vec<bool>,
}

impl TransferSession {
    pub fn new(session_id: String, total_chunks: u32) -> Self {
        Self {
            session_id,
            acknowledged: vec![false; total_chunks as usize],
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn total_chunks(&self) -> u32 {
        self.acknowledged.len() as u32
    }

    /// Records the acknowledgement of `index`. Out-of-range indices are ignored.
    pub fn acknowledge(&mut self, index: u32) {
        if let Some(slot) = self.acknowledged.get_mut(index as usize) {
            *slot = true;
        }
    }

    pub fn is_acknowledged(&self, index: u32) -> bool {
        self.acknowledged.get(index as usize).copied().unwrap_or(false)
    }

    /// Number of acknowledged chunks.
    pub fn acknowledged_count(&self) -> u32 {
        self.acknowledged.iter().filter(|a| **a).count() as u32
    }

    /// First chunk without an acknowledgement, if any.
    pub fn next_unacknowledged(&self) -> Option<u32> {
        self.acknowledged
            .iter()
            .position(|a| !a)
            .map(|i| i as u32)
    }

    pub fn is_complete(&self) -> bool {
        self.acknowledged.iter().all(|a| *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn sample_file(size: usize) -> SourceFile {
        SourceFile::new("report.pdf", vec![b'x'; size])
    }

    fn sample_record() -> TransferRecord {
        TransferRecord {
            id: "r1".into(),
            filename: "report.pdf".into(),
            url: None,
            size: 1000,
            content_type: "application/pdf".into(),
            is_image: false,
            is_document: true,
        }
    }

    #[test]
    fn source_file_guesses_content_type() {
        let file = sample_file(3);
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size(), 3);

        let unknown = SourceFile::new("blob", vec![0u8; 1]);
        assert_eq!(unknown.content_type, "application/octet-stream");

        let explicit = unknown.with_content_type("image/png");
        assert_eq!(explicit.content_type, "image/png");
    }

    #[tokio::test]
    async fn source_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = SourceFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(&file.data[..], b"hello");
    }

    #[test]
    fn status_state_machine() {
        use TransferStatus::*;
        assert!(Pending.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Uploading));
        assert!(Paused.can_transition_to(Cancelled));
        assert!(Error.can_transition_to(Pending));

        assert!(!Uploading.can_transition_to(Pending));
        assert!(!Paused.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Uploading));
        assert!(!Cancelled.can_transition_to(Uploading));
        assert!(!Paused.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Error.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Paused.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Uploading).unwrap(),
            "\"uploading\""
        );
        assert_eq!(TransferStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn new_progress_is_pending() {
        let p = TransferProgress::new("t1".into(), &sample_file(1000));
        assert_eq!(p.status, TransferStatus::Pending);
        assert_eq!(p.total_bytes, 1000);
        assert_eq!(p.bytes_transferred, 0);
        assert_eq!(p.progress, 0.0);
    }

    #[test]
    fn record_bytes_updates_speed_and_eta() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(1000));
        let start = Utc::now();
        p.start(start);
        p.record_bytes(500, start + TimeDelta::seconds(2));

        assert_eq!(p.bytes_transferred, 500);
        assert!((p.progress - 50.0).abs() < f64::EPSILON);
        assert!((p.speed - 250.0).abs() < 1e-9);
        assert!((p.eta_seconds.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn record_bytes_is_monotonic_and_clamped() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(1000));
        let now = Utc::now();
        p.start(now);
        p.record_bytes(600, now);
        p.record_bytes(200, now);
        assert_eq!(p.bytes_transferred, 600);

        p.record_bytes(5000, now);
        assert_eq!(p.bytes_transferred, 1000);
        assert!(p.progress <= 100.0);
    }

    #[test]
    fn complete_sets_full_progress_and_locator() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(1000));
        let now = Utc::now();
        p.start(now);
        p.complete(sample_record(), now);

        assert_eq!(p.status, TransferStatus::Completed);
        assert_eq!(p.bytes_transferred, p.total_bytes);
        assert_eq!(p.progress, 100.0);
        assert_eq!(p.locator.as_deref(), Some("r1"));
        assert!(p.ended_at.is_some());
    }

    #[test]
    fn fail_records_error() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(10));
        p.start(Utc::now());
        p.fail("disk full", Utc::now());
        assert_eq!(p.status, TransferStatus::Error);
        assert_eq!(p.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn reset_for_resume_from_error() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(1000));
        let now = Utc::now();
        p.start(now);
        p.record_bytes(700, now);
        p.record_chunk(3, 5);
        p.fail("boom", now);

        p.reset_for_resume();
        assert_eq!(p.status, TransferStatus::Pending);
        assert_eq!(p.bytes_transferred, 0);
        assert!(p.error.is_none());
        assert!(p.current_chunk.is_none());
    }

    #[test]
    fn reset_for_resume_keeps_paused() {
        let mut p = TransferProgress::new("t1".into(), &sample_file(1000));
        p.start(Utc::now());
        p.record_bytes(300, Utc::now());
        p.pause();

        p.reset_for_resume();
        assert_eq!(p.status, TransferStatus::Paused);
        assert_eq!(p.bytes_transferred, 0);
    }

    #[test]
    fn session_acknowledgements() {
        let mut session = TransferSession::new("s1".into(), 3);
        assert_eq!(session.id(), "s1");
        assert_eq!(session.total_chunks(), 3);
        assert_eq!(session.next_unacknowledged(), Some(0));

        session.acknowledge(0);
        session.acknowledge(1);
        assert!(session.is_acknowledged(1));
        assert_eq!(session.acknowledged_count(), 2);
        assert_eq!(session.next_unacknowledged(), Some(2));
        assert!(!session.is_complete());

        session.acknowledge(2);
        session.acknowledge(9);
        assert!(session.is_complete());
        assert_eq!(session.next_unacknowledged(), None);
    }
}

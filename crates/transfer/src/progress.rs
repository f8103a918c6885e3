use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{TransferProgress, TransferStatus};

// ---------------------------------------------------------------------------
// Throughput
// ---------------------------------------------------------------------------

/// Speed and remaining time derived from bytes sent over elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub bytes_per_second: f64,
    /// `None` while the speed is zero.
    pub eta_seconds: Option<f64>,
}

impl Throughput {
    /// Average rate since the transfer started.
    pub fn measure(transferred: u64, remaining: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || transferred == 0 {
            return Self {
                bytes_per_second: 0.0,
                eta_seconds: None,
            };
        }
        let bytes_per_second = transferred as f64 / secs;
        Self {
            bytes_per_second,
            eta_seconds: Some(remaining as f64 / bytes_per_second),
        }
    }
}

// ---------------------------------------------------------------------------
// AggregateProgress
// ---------------------------------------------------------------------------

/// Summary over every transfer currently in the registry.
///
/// Always recomputed from the records it is given; never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateProgress {
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    /// Overall percentage in `[0, 100]`.
    pub progress: f64,
    pub pending: usize,
    pub uploading: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Combined speed of the transfers currently uploading.
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

impl AggregateProgress {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TransferProgress>) -> Self {
        let mut agg = Self::default();
        let mut remaining_active: u64 = 0;

        for record in records {
            agg.total_bytes += record.total_bytes;
            agg.bytes_transferred += record.bytes_transferred;
            match record.status {
                TransferStatus::Pending => agg.pending += 1,
                TransferStatus::Uploading => {
                    agg.uploading += 1;
                    agg.speed += record.speed;
                }
                TransferStatus::Paused => agg.paused += 1,
                TransferStatus::Completed => agg.completed += 1,
                TransferStatus::Error => agg.failed += 1,
                TransferStatus::Cancelled => agg.cancelled += 1,
            }
            if !record.status.is_terminal() {
                remaining_active += record.remaining_bytes();
            }
        }

        if agg.total_bytes > 0 {
            agg.progress = agg.bytes_transferred as f64 / agg.total_bytes as f64 * 100.0;
        }
        if agg.speed > 0.0 {
            agg.eta_seconds = Some(remaining_active as f64 / agg.speed);
        }
        agg
    }

    /// Transfers that have not reached a terminal state.
    pub fn active(&self) -> usize {
        self.pending + self.uploading + self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceFile;
    use chrono::Utc;

    fn record(id: &str, size: usize, sent: u64, status: TransferStatus) -> TransferProgress {
        let file = SourceFile::new(format!("{id}.pdf"), vec![0u8; size]);
        let mut p = TransferProgress::new(id.into(), &file);
        p.start(Utc::now());
        p.record_bytes(sent, Utc::now());
        p.status = status;
        p
    }

    #[test]
    fn throughput_no_elapsed_time() {
        let t = Throughput::measure(100, 100, Duration::ZERO);
        assert_eq!(t.bytes_per_second, 0.0);
        assert!(t.eta_seconds.is_none());
    }

    #[test]
    fn throughput_nothing_sent() {
        let t = Throughput::measure(0, 100, Duration::from_secs(3));
        assert_eq!(t.bytes_per_second, 0.0);
        assert!(t.eta_seconds.is_none());
    }

    #[test]
    fn throughput_rate_and_eta() {
        let t = Throughput::measure(1000, 3000, Duration::from_secs(4));
        assert!((t.bytes_per_second - 250.0).abs() < 1e-9);
        assert!((t.eta_seconds.unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_empty() {
        let agg = AggregateProgress::from_records(std::iter::empty());
        assert_eq!(agg.total_bytes, 0);
        assert_eq!(agg.progress, 0.0);
        assert_eq!(agg.active(), 0);
    }

    #[test]
    fn aggregate_counts_and_bytes() {
        let mut uploading = record("a", 1000, 500, TransferStatus::Uploading);
        uploading.speed = 100.0;
        let records = vec![
            uploading,
            record("b", 1000, 1000, TransferStatus::Completed),
            record("c", 2000, 0, TransferStatus::Pending),
            record("d", 1000, 0, TransferStatus::Error),
        ];

        let agg = AggregateProgress::from_records(&records);
        assert_eq!(agg.total_bytes, 5000);
        assert_eq!(agg.bytes_transferred, 1500);
        assert!((agg.progress - 30.0).abs() < 1e-9);
        assert_eq!(agg.uploading, 1);
        assert_eq!(agg.completed, 1);
        assert_eq!(agg.pending, 1);
        assert_eq!(agg.failed, 1);
        assert_eq!(agg.active(), 2);
        // 500 left on "a" plus 2000 on "c", at 100 B/s.
        assert!((agg.eta_seconds.unwrap() - 25.0).abs() < 1e-9);
    }
}

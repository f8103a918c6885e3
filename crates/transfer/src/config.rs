//! Engine configuration.
//!
//! Stored as TOML with every field optional; missing fields take the
//! defaults below. Durations are expressed in milliseconds (`*_ms`).

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use ferry_protocol::UploadMetadata;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

const MIB: u64 = 1024 * 1024;

/// MIME types accepted by default: the document, image, archive and data
/// formats the storage backend allows.
const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "application/rtf",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "application/zip",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "text/csv",
    "application/json",
    "application/xml",
];

/// Process-wide transfer defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes; also the direct/chunked routing threshold.
    pub chunk_size: u64,
    /// Maximum number of transfers in `uploading` at once.
    pub max_concurrent_uploads: usize,
    /// Accepted content types.
    pub allowed_types: BTreeSet<String>,
    /// Per-file size limit in bytes.
    pub max_file_size: u64,
    /// Aggregate size above which a batch gets a warning.
    pub max_total_size: u64,
    /// Size above which a single file gets a warning.
    pub large_file_threshold: u64,
    /// Retries after the first failed attempt of a chunk or direct request.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    /// Multiplier applied to the delay for each further retry (1.0 = fixed).
    pub retry_backoff: f64,
    /// Upper bound for any single retry delay.
    #[serde(rename = "max_retry_delay_ms", with = "millis")]
    pub max_retry_delay: Duration,
    /// When false the first failure is terminal.
    pub auto_retry: bool,
    /// Capacity of the engine's event channel.
    pub event_capacity: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_uploads: 3,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_file_size: 100 * MIB,
            max_total_size: 500 * MIB,
            large_file_threshold: 50 * MIB,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            retry_backoff: 1.0,
            max_retry_delay: Duration::from_secs(30),
            auto_retry: true,
            event_capacity: 256,
        }
    }
}

impl TransferConfig {
    /// Parses a TOML document and validates the result.
    pub fn from_toml_str(content: &str) -> Result<Self, TransferError> {
        let config: TransferConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "transfer configuration loaded");
        Ok(config)
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(TransferError::InvalidConfig(
                "max_concurrent_uploads must be >= 1".into(),
            ));
        }
        if self.retry_backoff.is_nan() || self.retry_backoff < 1.0 {
            return Err(TransferError::InvalidConfig(
                "retry_backoff must be >= 1.0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(TransferError::InvalidConfig(
                "event_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the effective configuration for one call.
    pub fn with_overrides(&self, options: &TransferOptions) -> Result<Self, TransferError> {
        let mut config = self.clone();
        if let Some(chunk_size) = options.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(limit) = options.max_concurrent_uploads {
            config.max_concurrent_uploads = limit;
        }
        if let Some(retries) = options.max_retries {
            config.max_retries = retries;
        }
        if let Some(delay) = options.retry_delay {
            config.retry_delay = delay;
        }
        if let Some(auto_retry) = options.auto_retry {
            config.auto_retry = auto_retry;
        }
        config.validate()?;
        Ok(config)
    }

    /// True when a payload of `size` bytes must use the chunked path.
    pub fn requires_chunking(&self, size: u64) -> bool {
        size > self.chunk_size
    }
}

/// Per-call options: overrides of [`TransferConfig`] plus upload metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferOptions {
    pub chunk_size: Option<u64>,
    pub max_concurrent_uploads: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub auto_retry: Option<bool>,
    pub metadata: UploadMetadata,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

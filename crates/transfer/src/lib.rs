//! Transport-independent building blocks of the transfer engine.
//!
//! Configuration, pre-flight validation, the per-transfer progress record
//! and its status state machine, chunk planning and checksums. Nothing in
//! this crate touches the network.

mod chunked;
mod config;
mod content;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkPlan, ChunkRange, checksum_bytes};
pub use config::{TransferConfig, TransferOptions};
pub use content::{AttachmentKind, guess_content_type, looks_executable};
pub use progress::{AggregateProgress, Throughput};
pub use types::{SourceFile, TransferProgress, TransferSession, TransferStatus};
pub use validation::{BatchValidation, ValidationResult, validate, validate_batch};

/// Default chunk size: 5 MiB.
///
/// Payloads of at most this size go through the direct path.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Longest accepted file name, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

//! Resumable, chunked file-transfer engine.
//!
//! This crate implements the **transfer logic** on top of the primitives in
//! `ferry-transfer`. It has no transport dependency: callers provide a
//! `RemoteTransferApi` implementation (`ferry-http` ships one).
//!
//! # Flow
//!
//! 1. **Submit**: validate files, register the accepted ones as pending
//! 2. **Schedule**: admit transfers in batches under a concurrency limit
//! 3. **Route**: payloads up to the chunk size go direct, larger ones chunked
//! 4. **Retry**: every direct or chunk request is retried on transport errors
//! 5. **Finish**: the registry records completed, error or cancelled

pub mod api;
mod chunked;
mod direct;
pub mod engine;
pub mod error;
mod registry;
pub mod retry;
mod scheduler;
pub mod types;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use api::{ApiFuture, ChunkUpload, DirectUploadRequest, ProgressFn, RemoteTransferApi};
pub use engine::TransferEngine;
pub use error::{LifecycleError, UploadError};
pub use retry::RetryPolicy;
pub use types::{BatchReport, Rejection, Submission, TransferEvent, TransferId, TransferOutcome};

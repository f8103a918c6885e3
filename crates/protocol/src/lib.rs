//! Wire types for the remote transfer API.
//!
//! The engine talks to five endpoints: a single-request direct upload and
//! a session-based chunked upload (init, chunk, complete, abort). This crate
//! holds the request/response shapes and the endpoint paths; it has no I/O.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{ChunkAck, SessionInitRequest, SessionInitResponse};
pub use types::{TransferRecord, UploadMetadata};

//! Remote transfer API seam.
//!
//! `RemoteTransferApi` is implemented by the transport crate (HTTP) and by
//! test mocks. Keeping the engine behind a trait keeps retry, scheduling
//! and lifecycle logic independent of the wire.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use ferry_protocol::{ChunkAck, SessionInitRequest, SessionInitResponse, TransferRecord, UploadMetadata};

use crate::error::UploadError;

/// Future returned by every API call.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Receives the cumulative number of payload bytes handed to the transport.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Single-request upload of a whole payload.
#[derive(Debug, Clone)]
pub struct DirectUploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub data: Arc<[u8]>,
    /// Hex SHA-256 of `data`.
    pub checksum: String,
    pub metadata: UploadMetadata,
}

/// One chunk of a session.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub index: u32,
    /// Byte offset of this chunk within the payload.
    pub offset: u64,
    /// Slice of the shared payload; clones do not copy the bytes.
    pub data: Bytes,
    /// Hex SHA-256 of `data`.
    pub checksum: String,
}

/// Abstract client of the remote transfer endpoint.
pub trait RemoteTransferApi: Send + Sync {
    /// Uploads a payload in one request, reporting bytes sent through `progress`.
    fn direct_upload(
        &self,
        request: DirectUploadRequest,
        progress: ProgressFn,
    ) -> ApiFuture<'_, TransferRecord>;

    /// Opens a chunked upload session.
    fn init_session<'a>(
        &'a self,
        request: &'a SessionInitRequest,
    ) -> ApiFuture<'a, SessionInitResponse>;

    /// Sends one chunk of an open session.
    fn upload_chunk<'a>(&'a self, session_id: &'a str, chunk: ChunkUpload) -> ApiFuture<'a, ChunkAck>;

    /// Finalizes a session once every chunk is acknowledged.
    fn complete_session<'a>(&'a self, session_id: &'a str) -> ApiFuture<'a, TransferRecord>;

    /// Discards a session and its uploaded chunks.
    fn abort_session<'a>(&'a self, session_id: &'a str) -> ApiFuture<'a, ()>;
}

//! Scripted in-memory `RemoteTransferApi` for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use ferry_protocol::{ChunkAck, SessionInitRequest, SessionInitResponse, TransferRecord};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::api::{ApiFuture, ChunkUpload, DirectUploadRequest, ProgressFn, RemoteTransferApi};
use crate::error::UploadError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Direct { file_name: String, size: u64 },
    Init { file_name: String, chunk_count: u32, chunk_size: u64 },
    Chunk { index: u32, offset: u64, len: u64 },
    Complete,
    Abort,
}

pub(crate) struct MockApi {
    calls: Mutex<Vec<Call>>,
    session_id: Mutex<String>,
    failing_chunks: Mutex<HashSet<u32>>,
    direct_failures: AtomicU32,
    rejected_chunk: Mutex<Option<u32>>,
    latency: Mutex<Duration>,
    blocked: AtomicBool,
    unblock: Notify,
    stalled_abort: AtomicBool,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a MockApi);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            session_id: Mutex::new("session-1".into()),
            failing_chunks: Mutex::new(HashSet::new()),
            direct_failures: AtomicU32::new(0),
            rejected_chunk: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            blocked: AtomicBool::new(false),
            unblock: Notify::new(),
            stalled_abort: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Chunk `index` fails with a transport error on every attempt.
    pub(crate) fn fail_chunk(&self, index: u32) {
        self.failing_chunks.lock().insert(index);
    }

    /// The next `n` direct uploads fail with a transport error.
    pub(crate) fn fail_direct_times(&self, n: u32) {
        self.direct_failures.store(n, Ordering::SeqCst);
    }

    /// Chunk `index` is answered with `uploaded: false`.
    pub(crate) fn reject_chunk(&self, index: u32) {
        *self.rejected_chunk.lock() = Some(index);
    }

    pub(crate) fn set_session_id(&self, id: &str) {
        *self.session_id.lock() = id.to_string();
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Holds every request until [`MockApi::release`].
    pub(crate) fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        self.unblock.notify_waiters();
    }

    /// Abort requests are recorded and then never answered.
    pub(crate) fn stall_abort(&self) {
        self.stalled_abort.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: Call) -> InFlight<'_> {
        self.calls.lock().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self);

        loop {
            let notified = self.unblock.notified();
            if !self.blocked.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn record_for(name: &str, size: u64) -> TransferRecord {
        TransferRecord {
            id: format!("rec-{name}"),
            filename: name.to_string(),
            url: Some(format!("https://files.example/{name}")),
            size,
            content_type: "application/octet-stream".into(),
            is_image: false,
            is_document: false,
        }
    }
}

impl RemoteTransferApi for MockApi {
    fn direct_upload(
        &self,
        request: DirectUploadRequest,
        progress: ProgressFn,
    ) -> ApiFuture<'_, TransferRecord> {
        Box::pin(async move {
            let size = request.data.len() as u64;
            let _guard = self
                .enter(Call::Direct {
                    file_name: request.file_name.clone(),
                    size,
                })
                .await;

            progress(size / 2);
            let failing = self
                .direct_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(UploadError::Transport("connection reset".into()));
            }
            progress(size);
            Ok(Self::record_for(&request.file_name, size))
        })
    }

    fn init_session<'a>(
        &'a self,
        request: &'a SessionInitRequest,
    ) -> ApiFuture<'a, SessionInitResponse> {
        Box::pin(async move {
            let _guard = self
                .enter(Call::Init {
                    file_name: request.filename.clone(),
                    chunk_count: request.chunk_count,
                    chunk_size: request.chunk_size,
                })
                .await;
            Ok(SessionInitResponse {
                session_id: self.session_id.lock().clone(),
            })
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        _session_id: &'a str,
        chunk: ChunkUpload,
    ) -> ApiFuture<'a, ChunkAck> {
        Box::pin(async move {
            let _guard = self
                .enter(Call::Chunk {
                    index: chunk.index,
                    offset: chunk.offset,
                    len: chunk.data.len() as u64,
                })
                .await;

            if self.failing_chunks.lock().contains(&chunk.index) {
                return Err(UploadError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            let uploaded = *self.rejected_chunk.lock() != Some(chunk.index);
            Ok(ChunkAck {
                chunk_id: format!("chunk-{}", chunk.index),
                chunk_index: chunk.index,
                uploaded,
                message: String::new(),
            })
        })
    }

    fn complete_session<'a>(&'a self, session_id: &'a str) -> ApiFuture<'a, TransferRecord> {
        Box::pin(async move {
            let _guard = self.enter(Call::Complete).await;
            Ok(Self::record_for(session_id, 0))
        })
    }

    fn abort_session<'a>(&'a self, _session_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.calls.lock().push(Call::Abort);
            if self.stalled_abort.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}

/// Polls `cond` until it holds, yielding to the runtime in between.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

//! Chunked path: init, chunk × N, complete.
//!
//! Chunks of one transfer are sent strictly in index order, one at a time;
//! only distinct transfers run in parallel. Any failure after the session
//! is open (including pause and cancel) triggers a best-effort abort.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use ferry_protocol::{SessionInitRequest, TransferRecord};
use ferry_transfer::{ChunkPlan, TransferSession, checksum_bytes};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ChunkUpload, RemoteTransferApi};
use crate::error::UploadError;
use crate::registry::Run;
use crate::retry::{RetryPolicy, cancellable};
use crate::types::TransferEvent;

/// Upper bound on the best-effort abort request. The run keeps its
/// concurrency slot until the abort returns.
const ABORT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) async fn upload_chunked(
    api: &dyn RemoteTransferApi,
    run: &Run,
    events: &broadcast::Sender<TransferEvent>,
) -> Result<TransferRecord, UploadError> {
    let file = run.file();
    let plan = ChunkPlan::new(file.size(), run.config().chunk_size);
    let Some(chunk_count) = plan.checked_chunk_count() else {
        return Err(UploadError::Validation(vec![format!(
            "file needs more than {} chunks",
            u32::MAX
        )]));
    };

    let request = SessionInitRequest {
        filename: file.name.clone(),
        total_size: plan.total_size(),
        content_type: file.content_type.clone(),
        chunk_count,
        chunk_size: plan.chunk_size(),
        checksum: checksum_bytes(&file.data),
        metadata: run.metadata().clone(),
    };

    // Not retried, and runs to completion even if the token fires; the first
    // chunk then observes the cancel and the opened session is aborted.
    let response = api.init_session(&request).await?;
    if response.session_id.is_empty() {
        return Err(UploadError::Protocol(
            "session init returned no session id".into(),
        ));
    }

    let mut session = TransferSession::new(response.session_id, chunk_count);
    info!(
        transfer = %run.id,
        session = %session.id(),
        chunks = chunk_count,
        chunk_size = plan.chunk_size(),
        "upload session opened"
    );

    match send_chunks(api, run, events, &plan, &mut session).await {
        Ok(record) => {
            info!(transfer = %run.id, session = %session.id(), "upload session completed");
            Ok(record)
        }
        Err(e) => {
            abort_session(api, run, session.id(), &e).await;
            Err(e)
        }
    }
}

async fn send_chunks(
    api: &dyn RemoteTransferApi,
    run: &Run,
    events: &broadcast::Sender<TransferEvent>,
    plan: &ChunkPlan,
    session: &mut TransferSession,
) -> Result<TransferRecord, UploadError> {
    let payload = Bytes::from_owner(Arc::clone(&run.file().data));
    let session_id = session.id().to_string();
    let total = session.total_chunks();
    let policy = RetryPolicy::from_config(run.config());

    for range in plan.ranges() {
        let data = payload.slice(range.offset as usize..range.end() as usize);
        let chunk = ChunkUpload {
            index: range.index,
            offset: range.offset,
            checksum: checksum_bytes(&data),
            data,
        };

        let ack = policy
            .run(&run.cancel, "chunk upload", |_| {
                api.upload_chunk(&session_id, chunk.clone())
            })
            .await?;

        if !ack.uploaded || ack.chunk_index != range.index {
            return Err(UploadError::Protocol(format!(
                "chunk {} not acknowledged (ack index {}, uploaded {}): {}",
                range.index, ack.chunk_index, ack.uploaded, ack.message
            )));
        }

        session.acknowledge(range.index);
        debug!(
            transfer = %run.id,
            session = %session_id,
            chunk = range.index,
            total,
            "chunk acknowledged"
        );

        let acknowledged = session.acknowledged_count();
        let snapshot = run.update(|p| {
            p.record_bytes(range.end(), Utc::now());
            p.record_chunk(acknowledged, total);
        });
        if let Some(progress) = snapshot {
            let _ = events.send(TransferEvent::Progress {
                id: run.id.clone(),
                progress,
            });
        }
    }

    if let Some(missing) = session.next_unacknowledged() {
        return Err(UploadError::Protocol(format!(
            "chunk {missing} was never acknowledged"
        )));
    }

    cancellable(&run.cancel, api.complete_session(&session_id)).await
}

/// Frees server-side resources of an interrupted session.
///
/// Failures and timeouts are logged and never replace the original error.
async fn abort_session(
    api: &dyn RemoteTransferApi,
    run: &Run,
    session_id: &str,
    cause: &UploadError,
) {
    debug!(transfer = %run.id, session = %session_id, cause = %cause, "aborting upload session");
    match tokio::time::timeout(ABORT_TIMEOUT, api.abort_session(session_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(transfer = %run.id, session = %session_id, error = %e, "session abort failed");
        }
        Err(_) => {
            warn!(
                transfer = %run.id,
                session = %session_id,
                timeout_s = ABORT_TIMEOUT.as_secs(),
                "session abort timed out"
            );
        }
    }
}

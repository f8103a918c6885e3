//! Direct path: the whole payload in one request.

use std::sync::Arc;

use chrono::Utc;
use ferry_protocol::TransferRecord;
use ferry_transfer::checksum_bytes;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::{DirectUploadRequest, ProgressFn, RemoteTransferApi};
use crate::error::UploadError;
use crate::registry::Run;
use crate::retry::RetryPolicy;
use crate::types::TransferEvent;

/// Uploads a payload of at most `chunk_size` bytes in a single request.
///
/// Byte progress comes from the transport's send callback. Each attempt is
/// wrapped by the retry policy; a retried request re-reports early offsets,
/// which the progress model ignores.
pub(crate) async fn upload_direct(
    api: &dyn RemoteTransferApi,
    run: &Run,
    events: &broadcast::Sender<TransferEvent>,
) -> Result<TransferRecord, UploadError> {
    let file = run.file();
    let request = DirectUploadRequest {
        file_name: file.name.clone(),
        content_type: file.content_type.clone(),
        data: Arc::clone(&file.data),
        checksum: checksum_bytes(&file.data),
        metadata: run.metadata().clone(),
    };

    let progress: ProgressFn = {
        let run = run.clone();
        let events = events.clone();
        Arc::new(move |sent| report_bytes(&run, &events, sent))
    };

    debug!(transfer = %run.id, bytes = file.size(), "direct upload");
    let policy = RetryPolicy::from_config(run.config());
    policy
        .run(&run.cancel, "direct upload", |_| {
            api.direct_upload(request.clone(), Arc::clone(&progress))
        })
        .await
}

/// Records cumulative bytes sent and publishes a progress event.
pub(crate) fn report_bytes(run: &Run, events: &broadcast::Sender<TransferEvent>, sent: u64) {
    if let Some(progress) = run.update(|p| p.record_bytes(sent, Utc::now())) {
        let _ = events.send(TransferEvent::Progress {
            id: run.id.clone(),
            progress,
        });
    }
}

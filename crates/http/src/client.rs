//! HTTP implementation of `RemoteTransferApi`.
//!
//! Async `reqwest` client with optional Bearer token authentication.

use std::sync::Arc;
use std::time::Duration;

use ferry_protocol::constants::{
    DIRECT_UPLOAD_PATH, FIELD_CHECKSUM, FIELD_CHUNK, FIELD_CHUNK_INDEX, FIELD_FILE,
    SESSION_INIT_PATH, session_chunk_path, session_complete_path, session_path,
};
use ferry_protocol::{ChunkAck, SessionInitRequest, SessionInitResponse, TransferRecord};
use ferry_uploader::{
    ApiFuture, ChunkUpload, DirectUploadRequest, ProgressFn, RemoteTransferApi, UploadError,
};
use futures_util::stream;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Size of the pieces a direct upload body is streamed in.
const STREAM_PIECE: usize = 64 * 1024;

/// Client of the remote transfer REST API.
#[derive(Clone)]
pub struct HttpTransferApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransferApi {
    /// Creates a client for `base_url`, authenticating with `bearer_token`
    /// when given.
    pub fn new(base_url: &str, bearer_token: Option<&str>) -> Result<Self, UploadError> {
        Self::build(base_url, bearer_token, None)
    }

    /// Like [`HttpTransferApi::new`], with a per-request timeout. A timed-out
    /// request counts as a transport error and is retried.
    pub fn with_timeout(
        base_url: &str,
        bearer_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        Self::build(base_url, bearer_token, Some(timeout))
    }

    fn build(
        base_url: &str,
        bearer_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| UploadError::Protocol("invalid bearer token".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and returns the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, UploadError> {
        let resp = request.send().await.map_err(transport)?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes().await.map_err(transport)?.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UploadError> {
        let body = self.send(request).await?;
        serde_json::from_slice(&body)
            .map_err(|e| UploadError::Protocol(format!("unexpected response body: {e}")))
    }
}

impl RemoteTransferApi for HttpTransferApi {
    fn direct_upload(
        &self,
        request: DirectUploadRequest,
        progress: ProgressFn,
    ) -> ApiFuture<'_, TransferRecord> {
        Box::pin(async move {
            let size = request.data.len() as u64;
            let body = reqwest::Body::wrap_stream(progress_stream(request.data, progress));
            let file = Part::stream_with_length(body, size)
                .file_name(request.file_name.clone())
                .mime_str(&request.content_type)
                .map_err(|e| {
                    UploadError::Protocol(format!(
                        "invalid content type '{}': {e}",
                        request.content_type
                    ))
                })?;

            let mut form = Form::new().text(FIELD_CHECKSUM, request.checksum);
            for (name, value) in request.metadata.form_fields() {
                form = form.text(name, value);
            }
            let form = form.part(FIELD_FILE, file);

            debug!(file = %request.file_name, bytes = size, "POST direct upload");
            self.send_json(self.http.post(self.url(DIRECT_UPLOAD_PATH)).multipart(form))
                .await
        })
    }

    fn init_session<'a>(
        &'a self,
        request: &'a SessionInitRequest,
    ) -> ApiFuture<'a, SessionInitResponse> {
        Box::pin(async move {
            debug!(file = %request.filename, chunks = request.chunk_count, "POST session init");
            self.send_json(self.http.post(self.url(SESSION_INIT_PATH)).json(request))
                .await
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        chunk: ChunkUpload,
    ) -> ApiFuture<'a, ChunkAck> {
        Box::pin(async move {
            let index = chunk.index;
            let len = chunk.data.len() as u64;
            let part = Part::stream_with_length(reqwest::Body::from(chunk.data), len)
                .file_name(format!("chunk_{index}"))
                .mime_str("application/octet-stream")
                .map_err(transport)?;
            let form = Form::new()
                .text(FIELD_CHUNK_INDEX, index.to_string())
                .text(FIELD_CHECKSUM, chunk.checksum)
                .part(FIELD_CHUNK, part);

            self.send_json(
                self.http
                    .post(self.url(&session_chunk_path(session_id)))
                    .multipart(form),
            )
            .await
        })
    }

    fn complete_session<'a>(&'a self, session_id: &'a str) -> ApiFuture<'a, TransferRecord> {
        Box::pin(async move {
            debug!(session = %session_id, "POST session complete");
            self.send_json(self.http.post(self.url(&session_complete_path(session_id))))
                .await
        })
    }

    fn abort_session<'a>(&'a self, session_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            debug!(session = %session_id, "DELETE session");
            self.send(self.http.delete(self.url(&session_path(session_id))))
                .await
                .map(|_| ())
        })
    }
}

/// Streams `data` in fixed pieces, reporting the cumulative byte count as
/// each piece is handed to the transport.
fn progress_stream(
    data: Arc<[u8]>,
    progress: ProgressFn,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = data.len();
    stream::iter((0..total).step_by(STREAM_PIECE).map(move |start| {
        let end = (start + STREAM_PIECE).min(total);
        let piece = data[start..end].to_vec();
        progress(end as u64);
        Ok(piece)
    }))
}

fn transport(e: reqwest::Error) -> UploadError {
    if e.is_timeout() {
        UploadError::Transport(format!("request timed out: {e}"))
    } else {
        UploadError::Transport(e.to_string())
    }
}

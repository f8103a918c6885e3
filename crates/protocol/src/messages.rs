use serde::{Deserialize, Serialize};

use crate::types::UploadMetadata;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens a chunked upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInitRequest {
    pub filename: String,
    pub total_size: u64,
    pub content_type: String,
    pub chunk_count: u32,
    pub chunk_size: u64,
    /// Hex SHA-256 of the whole payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(flatten)]
    pub metadata: UploadMetadata,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Session allocated by the remote endpoint.
///
/// A missing id deserializes as empty so the caller can reject it as a
/// protocol error instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInitResponse {
    #[serde(default)]
    pub session_id: String,
}

/// Acknowledges one chunk of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    #[serde(default)]
    pub chunk_id: String,
    pub chunk_index: u32,
    pub uploaded: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_request_flattens_metadata() {
        let req = SessionInitRequest {
            filename: "video.zip".into(),
            total_size: 50 * 1024 * 1024,
            content_type: "application/zip".into(),
            chunk_count: 25,
            chunk_size: 2 * 1024 * 1024,
            checksum: String::new(),
            metadata: UploadMetadata::default().associate("ticket_id", "7"),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["chunk_count"], 25);
        assert_eq!(value["is_public"], true);
        assert_eq!(value["associations"]["ticket_id"], "7");
        assert!(value.get("checksum").is_none());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn init_response_missing_session_id() {
        let resp: SessionInitResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.session_id.is_empty());
    }

    #[test]
    fn chunk_ack_parses() {
        let json = r#"{"chunk_id":"c-3","chunk_index":3,"uploaded":true,"message":"ok"}"#;
        let ack: ChunkAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.chunk_index, 3);
        assert!(ack.uploaded);
        assert_eq!(ack.message, "ok");
    }
}

//! Endpoint paths of the remote transfer API.
//!
//! Paths are relative to the API base URL configured by the caller.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped in a session id path segment. `.` stays escaped so an
/// id can never form a dot-segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

/// Single-request upload of a whole payload (multipart).
pub const DIRECT_UPLOAD_PATH: &str = "/attachments/upload";

/// Opens a chunked upload session (JSON).
pub const SESSION_INIT_PATH: &str = "/attachments/chunked/init";

/// Multipart field carrying the file payload on direct upload.
pub const FIELD_FILE: &str = "file";

/// Multipart field carrying the raw bytes of one chunk.
pub const FIELD_CHUNK: &str = "chunk";

/// Multipart field carrying the zero-based chunk index.
pub const FIELD_CHUNK_INDEX: &str = "chunk_index";

/// Multipart field carrying a hex SHA-256 digest.
pub const FIELD_CHECKSUM: &str = "checksum";

/// Path of a chunked session resource; `DELETE` on it aborts the session.
///
/// The id is server-issued and is encoded as a single path segment.
pub fn session_path(session_id: &str) -> String {
    let encoded = utf8_percent_encode(session_id, SEGMENT);
    format!("/attachments/chunked/{encoded}")
}

/// Path that accepts one chunk of a session.
pub fn session_chunk_path(session_id: &str) -> String {
    format!("{}/chunk", session_path(session_id))
}

/// Path that finalizes a session and returns the stored record.
pub fn session_complete_path(session_id: &str) -> String {
    format!("{}/complete", session_path(session_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_paths() {
        assert_eq!(session_path("abc"), "/attachments/chunked/abc");
        assert_eq!(session_chunk_path("abc"), "/attachments/chunked/abc/chunk");
        assert_eq!(
            session_complete_path("abc"),
            "/attachments/chunked/abc/complete"
        );
    }

    #[test]
    fn session_id_stays_one_segment() {
        assert_eq!(session_path("s#1"), "/attachments/chunked/s%231");
        assert_eq!(
            session_chunk_path("a/b?c"),
            "/attachments/chunked/a%2Fb%3Fc/chunk"
        );
        assert_eq!(
            session_path("../../upload"),
            "/attachments/chunked/%2E%2E%2F%2E%2E%2Fupload"
        );
        assert_eq!(session_path("0b1e-4f_x~"), "/attachments/chunked/0b1e-4f_x~");
    }
}

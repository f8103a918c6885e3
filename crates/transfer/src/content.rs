//! Content-type guessing and payload classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Leading bytes of executable formats: PE, ELF, Java class, Mach-O.
const EXECUTABLE_SIGNATURES: &[&[u8]] = &[
    b"MZ",
    b"\x7fELF",
    b"\xca\xfe\xba\xbe",
    b"\xfe\xed\xfa",
];

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Guesses a MIME type from the file extension.
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = extension(name);
    match ext.as_deref() {
        Some("pdf") => Some("application/pdf"),
        Some("doc") => Some("application/msword"),
        Some("docx") => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        Some("xls") => Some("application/vnd.ms-excel"),
        Some("xlsx") => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        Some("ppt") => Some("application/vnd.ms-powerpoint"),
        Some("pptx") => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        Some("txt") => Some("text/plain"),
        Some("rtf") => Some("application/rtf"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        Some("gif") => Some("image/gif"),
        Some("bmp") => Some("image/bmp"),
        Some("svg") => Some("image/svg+xml"),
        Some("zip") => Some("application/zip"),
        Some("rar") => Some("application/vnd.rar"),
        Some("7z") => Some("application/x-7z-compressed"),
        Some("csv") => Some("text/csv"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("application/xml"),
        Some("exe" | "dll" | "msi") => Some("application/x-msdownload"),
        Some("sh") => Some("application/x-sh"),
        Some("js") => Some("text/javascript"),
        _ => None,
    }
}

/// Returns true when the payload starts with a known executable signature.
pub fn looks_executable(data: &[u8]) -> bool {
    EXECUTABLE_SIGNATURES.iter().any(|sig| data.starts_with(sig))
}

/// Coarse classification of an attachment, sent as its default category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Document,
    Image,
    Spreadsheet,
    Presentation,
    Other,
}

impl AttachmentKind {
    /// Classifies by file extension.
    pub fn from_filename(name: &str) -> Self {
        match extension(name).as_deref() {
            Some("pdf" | "doc" | "docx" | "txt" | "rtf") => Self::Document,
            Some("jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg") => Self::Image,
            Some("xls" | "xlsx" | "csv") => Self::Spreadsheet,
            Some("ppt" | "pptx") => Self::Presentation,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Other => "other",
        }
    }
}

//! Pre-flight validation of candidate files.
//!
//! Pure functions: no I/O, no side effects. Every check runs and errors
//! accumulate, so a caller sees all problems with a file at once.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunked::ChunkPlan;
use crate::config::TransferConfig;
use crate::content::looks_executable;
use crate::types::SourceFile;
use crate::MAX_FILENAME_LEN;

/// Extensions of executable or script formats, rejected regardless of size.
const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "pif", "vbs", "vbe", "js", "jse", "jar", "msi", "msp",
    "dll", "ps1", "sh", "app", "cpl", "hta", "reg", "wsf", "lnk",
];

/// Device names Windows refuses as file stems.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Outcome of validating one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
}

/// Outcome of validating a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchValidation {
    /// One result per input file, in input order.
    pub results: Vec<ValidationResult>,
    /// Batch-level warnings (aggregate size).
    pub warnings: Vec<String>,
    pub total_size: u64,
}

impl BatchValidation {
    /// Number of files that passed.
    pub fn valid_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_valid).count()
    }
}

/// Validates one file against `config`.
pub fn validate(file: &SourceFile, config: &TransferConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let size = file.size();

    if size == 0 {
        errors.push("file is empty".to_string());
    }

    if size > config.max_file_size {
        errors.push(format!(
            "file size {} exceeds the maximum of {}",
            format_bytes(size),
            format_bytes(config.max_file_size)
        ));
    }

    if let Some(error) = chunk_limit_error(size, config) {
        errors.push(error);
    }

    if !config.allowed_types.contains(&file.content_type) {
        errors.push(format!("file type '{}' is not allowed", file.content_type));
    }

    let name_len = file.name.chars().count();
    if name_len == 0 {
        errors.push("file name is empty".to_string());
    } else if name_len > MAX_FILENAME_LEN {
        errors.push(format!(
            "file name is {name_len} characters long (maximum {MAX_FILENAME_LEN})"
        ));
    }

    if let Some(reason) = unsafe_name_reason(&file.name) {
        errors.push(format!("file name is not allowed: {reason}"));
    }

    if let Some(ext) = dangerous_extension(&file.name) {
        errors.push(format!("files with the '.{ext}' extension are not allowed"));
    }

    if looks_executable(&file.data) {
        errors.push("file content looks like an executable".to_string());
    }

    if size > config.large_file_threshold {
        warnings.push(format!(
            "large file ({}); the upload may take a while",
            format_bytes(size)
        ));
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        file_name: file.name.clone(),
        file_size: size,
        content_type: file.content_type.clone(),
    }
}

/// Validates every file and checks the aggregate size.
///
/// The aggregate limit only produces a warning; rejection is per file.
pub fn validate_batch(files: &[SourceFile], config: &TransferConfig) -> BatchValidation {
    let results: Vec<ValidationResult> = files.iter().map(|f| validate(f, config)).collect();
    let total_size: u64 = files.iter().map(SourceFile::size).sum();

    let mut warnings = Vec::new();
    if total_size > config.max_total_size {
        warnings.push(format!(
            "total size {} exceeds the recommended maximum of {}",
            format_bytes(total_size),
            format_bytes(config.max_total_size)
        ));
    }

    BatchValidation {
        results,
        warnings,
        total_size,
    }
}

/// Refuses payloads whose chunk count would overflow the chunk index.
fn chunk_limit_error(size: u64, config: &TransferConfig) -> Option<String> {
    if !config.requires_chunking(size) {
        return None;
    }
    match ChunkPlan::new(size, config.chunk_size).checked_chunk_count() {
        Some(_) => None,
        None => Some(format!(
            "file needs more than {} chunks of {}; raise the chunk size",
            u32::MAX,
            format_bytes(config.chunk_size)
        )),
    }
}

fn dangerous_extension(name: &str) -> Option<String> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())?;
    DANGEROUS_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Rejects path traversal, control characters and reserved device names.
fn unsafe_name_reason(name: &str) -> Option<&'static str> {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Some("path separators and '..' are not permitted");
    }
    if name.chars().any(char::is_control) {
        return Some("control characters are not permitted");
    }
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_uppercase();
    if RESERVED_STEMS.contains(&stem.as_str()) {
        return Some("reserved device name");
    }
    None
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

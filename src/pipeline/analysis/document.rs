//! Uploaded bill payload: a base64 body plus its MIME type.
//!
//! Browsers hand over `data:<mime>;base64,<body>` URLs. The header is stripped
//! before transmission (the model API wants the bare body) and, when the caller
//! did not say what the file is, used as the MIME hint.

use base64::Engine as _;

use super::AnalysisError;

/// Maximum decoded document size (20 MB).
pub const MAX_DOCUMENT_BYTES: usize = 20 * 1024 * 1024;

/// MIME types the model accepts as inline document data.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    base64_data: String,
    mime_type: String,
    byte_len: usize,
}

impl DocumentPayload {
    /// Build from a data URL or bare base64 string.
    ///
    /// An empty `mime_type` falls back to the data-URL header, then to magic bytes.
    pub fn from_data_url(data: &str, mime_type: &str) -> Result<Self, AnalysisError> {
        let (header_mime, body) = split_data_url(data);
        let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if body.is_empty() {
            return Err(AnalysisError::EmptyDocument);
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.as_bytes())
            .map_err(|e| AnalysisError::InvalidDocument(format!("Base64 decode failed: {e}")))?;

        let mime = resolve_mime(mime_type, header_mime, &bytes);
        Self::validated(body, mime, bytes.len())
    }

    /// Build from raw file bytes (CLI path).
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Result<Self, AnalysisError> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyDocument);
        }
        let mime = resolve_mime(mime_type, None, bytes);
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::validated(encoded, mime, bytes.len())
    }

    fn validated(base64_data: String, mime_type: String, byte_len: usize) -> Result<Self, AnalysisError> {
        if byte_len == 0 {
            return Err(AnalysisError::EmptyDocument);
        }
        if byte_len > MAX_DOCUMENT_BYTES {
            return Err(AnalysisError::DocumentTooLarge(byte_len));
        }
        if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(AnalysisError::UnsupportedMime(mime_type));
        }
        Ok(Self {
            base64_data,
            mime_type,
            byte_len,
        })
    }

    /// Bare base64 body, header already stripped.
    pub fn base64_data(&self) -> &str {
        &self.base64_data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Decoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// Split `data:<mime>;base64,<body>` into its MIME and body. Anything without a
/// comma is treated as a bare body.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let trimmed = data.trim();
    match trimmed.find(',') {
        Some(idx) => {
            let header = &trimmed[..idx];
            let mime = header
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .map(str::trim)
                .filter(|m| !m.is_empty());
            (mime, &trimmed[idx + 1..])
        }
        None => (None, trimmed),
    }
}

fn resolve_mime(explicit: &str, header: Option<&str>, bytes: &[u8]) -> String {
    let explicit = explicit.trim();
    let chosen = if !explicit.is_empty() {
        explicit.to_string()
    } else if let Some(header) = header {
        header.to_string()
    } else {
        detect_mime(bytes).to_string()
    };
    normalize_mime(&chosen)
}

fn normalize_mime(mime: &str) -> String {
    let lower = mime.trim().to_ascii_lowercase();
    match lower.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => lower,
    }
}

/// Detect MIME type from magic bytes.
pub fn detect_mime(bytes: &[u8]) -> &'static str {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        "image/jpeg"
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
    {
        "image/png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        "image/heic"
    } else if bytes.len() >= 5 && &bytes[0..5] == b"%PDF-" {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

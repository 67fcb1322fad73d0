//! Error types for PDF Assembler

use thiserror::Error;

/// Result type alias for PDF Assembler
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for PDF Assembler
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed token in a page range expression
    #[error("Invalid page range token: {token:?}")]
    RangeSyntax { token: String },

    /// Range pair whose start is greater than its end
    #[error("Descending page range: {start}-{end}")]
    RangeOrder { start: u32, end: u32 },

    /// Range expression without any token
    #[error("Empty page selection")]
    EmptySelection,

    /// Resolved page number outside the document
    #[error("Page {page} out of bounds (valid range: 1-{total})")]
    PageOutOfBounds { page: u32, total: u32 },

    /// Rotation angle or watermark parameter outside its domain
    #[error("Invalid transform: {reason}")]
    InvalidTransform { reason: String },

    /// Codec failed to produce output for a validated plan
    #[error("Failed to materialize document: {reason}")]
    Materialization { reason: String },

    /// Operation descriptor has the wrong shape for its kind
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF file
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// Cache key not found
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound { key: String },

    /// Source resolution error
    #[error("Failed to resolve source: {reason}")]
    SourceResolution { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// qpdf error
    #[error("qpdf error: {reason}")]
    QpdfError { reason: String },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted,
    /// but validation errors keep the offending token or value.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::RangeSyntax { token } => format!("Invalid page range token: {:?}", token),
            Error::RangeOrder { start, end } => {
                format!("Descending page range: {}-{}", start, end)
            }
            Error::EmptySelection => "Empty page selection".to_string(),
            Error::PageOutOfBounds { page, total } => {
                format!("Page {} out of bounds (valid range: 1-{})", page, total)
            }
            Error::InvalidTransform { reason } => format!("Invalid transform: {}", reason),
            Error::Materialization { .. } => "Failed to materialize document".to_string(),
            Error::InvalidOperation { reason } => format!("Invalid operation: {}", reason),
            Error::PdfNotFound { .. } => "PDF not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::CacheKeyNotFound { .. } => "Cache key not found".to_string(),
            Error::SourceResolution { .. } => "Failed to resolve PDF source".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::QpdfError { .. } => "PDF processing error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
        }
    }

    /// Whether this error was raised while validating a request, before any
    /// output was materialized.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::RangeSyntax { .. }
                | Error::RangeOrder { .. }
                | Error::EmptySelection
                | Error::PageOutOfBounds { .. }
                | Error::InvalidTransform { .. }
                | Error::InvalidOperation { .. }
        )
    }
}

//! Error types for agriai-core

use thiserror::Error;

/// Main error type for the agriai-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value storage error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Classification service error (transport, HTTP status, response shape)
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Image could not be acquired (missing file, unsupported format)
    #[error("image acquisition failed: {0}")]
    Acquisition(String),

    /// Report could not be exported to a document
    #[error("export failed: {0}")]
    Export(String),

    /// A write would push the store past its byte quota
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    /// Report not found
    #[error("report not found: {0}")]
    ReportNotFound(String),

    /// A short report id matched more than one report
    #[error("report id {id} is ambiguous: {matches} reports match, use the full id")]
    AmbiguousReportId { id: String, matches: usize },
}

/// Result type alias for agriai-core
pub type Result<T> = std::result::Result<T, Error>;

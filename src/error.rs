//! Error types for the edgequake-docextract library.
//!
//! Every failure is fatal for the invocation that raised it. There is no
//! per-page error type: a page that fails to decode or extract fails the
//! whole document, because a silently incomplete result set is worse than a
//! visible failure for data that feeds onboarding and payment decisions.
//!
//! Nothing here is retried by the library. Whether an oracle failure is
//! transient is for the caller to decide; the original cause is always
//! reachable through [`std::error::Error::source`].

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause attached to decode and oracle failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// All errors returned by the edgequake-docextract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The caller named a document type that is not one of the supported kinds.
    #[error(
        "Unsupported document type '{value}'\n\
Expected one of: ic, passport, cash_deposit, bank_transfer, ssm_form_d, utility_bill"
    )]
    UnsupportedType { value: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file extension is not in the allow-list.
    #[error("Unsupported file type: '{name}'\nAccepted extensions: jpg, jpeg, png, pdf.")]
    UnsupportedFileType { name: String },

    /// The upload exceeds the configured size limit.
    #[error("File is {size} bytes, exceeding the {limit}-byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Decode errors ─────────────────────────────────────────────────────
    /// Bytes could not be decoded as an image or rasterised as a PDF.
    #[error("File processing failed: {detail}")]
    FileDecode {
        detail: String,
        #[source]
        source: Option<BoxError>,
    },

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// The extraction oracle raised for a page; its output is discarded.
    #[error("OCR processing failed on page {page}: {source}")]
    OracleInvocation {
        page: usize,
        #[source]
        source: BoxError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Deployment defect: e.g. no instruction registered for a valid type.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the results file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Build a [`ExtractError::FileDecode`] carrying the underlying cause.
    pub fn decode(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ExtractError::FileDecode {
            detail: detail.into(),
            source: Some(source.into()),
        }
    }
}

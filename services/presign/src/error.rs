//! Error types for descriptor issuance and multipart finalization.

use thiserror::Error;
use upload_protocol::ReceiptError;

/// Failures talking to the object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to build presigning config: {0}")]
    PresignConfig(String),

    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("No upload ID in create multipart response")]
    MissingUploadId,
}

impl StoreError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Request {
            operation,
            message: message.into(),
        }
    }
}

/// Errors raised while issuing transfer descriptors
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Missing store configuration: {0}")]
    Configuration(&'static str),

    #[error("Invalid file {name:?}: {reason}")]
    InvalidFile { name: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Batch of {count} files exceeds the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("File {key} needs {parts} parts, more than the limit of {max}")]
    TooManyParts { key: String, parts: u64, max: u64 },

    #[error("Failed to sign upload for {key}: {source}")]
    Signing {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl IssueError {
    /// Stable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            IssueError::Configuration(_) => "CONFIGURATION_ERROR",
            IssueError::InvalidFile { .. } => "INVALID_FILE",
            IssueError::InvalidRequest(_) => "INVALID_REQUEST",
            IssueError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            IssueError::TooManyParts { .. } => "TOO_MANY_PARTS",
            IssueError::Signing { .. } => "SIGNING_ERROR",
        }
    }
}

/// Errors raised while finalizing a multipart upload
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("Missing store configuration: {0}")]
    Configuration(&'static str),

    #[error("Invalid part receipts: {0}")]
    InvalidReceipts(#[from] ReceiptError),

    #[error("Upload {upload_id} was issued for key {expected}, not {received}")]
    KeyMismatch {
        upload_id: String,
        expected: String,
        received: String,
    },

    #[error("Store rejected finalize: {0}")]
    Store(#[from] StoreError),
}

impl FinalizeError {
    /// Stable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            FinalizeError::Configuration(_) => "CONFIGURATION_ERROR",
            FinalizeError::InvalidReceipts(_) => "INVALID_RECEIPTS",
            FinalizeError::KeyMismatch { .. } => "KEY_MISMATCH",
            FinalizeError::Store(_) => "FINALIZE_REJECTED",
        }
    }
}

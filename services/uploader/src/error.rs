//! Error types for the upload client.

use thiserror::Error;
use upload_protocol::ReceiptError;

/// Errors talking to the presign service
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Errors that end a single file's transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("No local file for {0}")]
    MissingSource(String),

    #[error("Descriptor could not be issued: {0}")]
    IssueFailed(String),

    #[error("Failed to read local bytes: {0}")]
    Source(#[from] std::io::Error),

    #[error("PUT failed: {0}")]
    Transport(String),

    #[error("PUT returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid part receipts: {0}")]
    InvalidReceipts(#[from] ReceiptError),

    #[error("Finalize failed: {0}")]
    Finalize(#[from] ApiError),
}

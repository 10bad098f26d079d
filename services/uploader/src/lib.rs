//! Upload Client - concurrent presigned-URL uploads with session progress
//!
//! This library drives a batch of local files into an S3-compatible object
//! store through the presign service. It handles:
//!
//! - Requesting single-shot or multipart transfer descriptors
//! - Concurrent part PUTs with byte-level, monotonic progress per file
//! - Client-side receipt checks and multipart finalization
//! - A session tracker with an auto-hiding control surface
//!
//! # Example
//!
//! ```rust,no_run
//! use upload_client::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load()?;
//!     let client = reqwest::Client::new();
//!
//!     let api = Arc::new(HttpUploadApi::new(client.clone(), &config.service_url));
//!     let transport = Arc::new(HttpTransport::new(client, config.progress_chunk_bytes));
//!     let session = UploadSession::new(api, transport, &config);
//!
//!     let source = Arc::new(FileSource::open("clip.mp4").await?);
//!     let files = vec![LocalFile::new("clip.mp4", "video/mp4", source)];
//!
//!     let handler = FnSettled::new(|outcome: &BatchOutcome| {
//!         println!("{} uploaded", outcome.completed.len());
//!         Ok(())
//!     });
//!     session.upload_files("owner", "event", &files, &handler).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod notifier;
pub mod progress;
pub mod session;
pub mod source;
pub mod tracker;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use api::{HttpUploadApi, UploadApi};
pub use config::{ClientConfig, ConfigError};
pub use engine::TransferEngine;
pub use error::{ApiError, TransferError};
pub use notifier::StatusNotifier;
pub use progress::ProgressAggregator;
pub use session::{BatchOutcome, FnSettled, SettledHandler, UploadSession};
pub use source::{content_type_for, BytesSource, FileSource, LocalFile, PartBody, UploadSource};
pub use tracker::{SessionSnapshot, SessionTracker, TaskStatus, UploadTask};
pub use transport::{HttpTransport, ObjectTransport, PutOutcome};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{HttpUploadApi, UploadApi};
    pub use crate::config::ClientConfig;
    pub use crate::session::{BatchOutcome, FnSettled, SettledHandler, UploadSession};
    pub use crate::source::{content_type_for, FileSource, LocalFile};
    pub use crate::tracker::{SessionSnapshot, TaskStatus};
    pub use crate::transport::HttpTransport;
}

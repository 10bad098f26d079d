use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Metadata for one file the client wants to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    /// File name, embedded as the last segment of the object key
    pub name: String,
    /// MIME type sent with the object
    pub content_type: String,
    /// Total size in bytes
    pub size_bytes: u64,
}

impl FileSpec {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size_bytes,
        }
    }
}

/// Request for a batch of transfer descriptors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    /// Owner of the uploaded objects (first key segment)
    pub owner_id: String,
    /// Logical grouping, e.g. an event (second key segment)
    pub group_id: String,
    /// Files in the batch; the response preserves this order
    pub files: Vec<FileSpec>,
}

/// Descriptors issued for a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub bucket: String,
    pub region: String,
    /// One descriptor per requested file, same order as the request
    pub uploads: Vec<TransferDescriptor>,
    /// URLs in `uploads` must not be used after this instant
    pub expires_at: DateTime<Utc>,
}

/// Pre-authorized URL for one part of a multipart transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    /// 1-based part number
    pub part_number: u32,
    pub url: String,
}

/// How a single file is to be transferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TransferDescriptor {
    /// One PUT of the whole object
    #[serde(rename_all = "camelCase")]
    Single {
        key: String,
        url: String,
        content_type: String,
    },
    /// One PUT per part, followed by a finalize call
    #[serde(rename_all = "camelCase")]
    Multipart {
        key: String,
        upload_id: String,
        part_size: u64,
        /// Contiguous part numbers 1..N in ascending order
        part_urls: Vec<PartUrl>,
    },
    /// The service could not sign URLs for this file
    #[serde(rename_all = "camelCase")]
    Failed { key: String, error: String },
}

impl TransferDescriptor {
    /// Object key, also used as the task id on the client
    pub fn key(&self) -> &str {
        match self {
            TransferDescriptor::Single { key, .. }
            | TransferDescriptor::Multipart { key, .. }
            | TransferDescriptor::Failed { key, .. } => key,
        }
    }

    /// Last segment of the object key
    pub fn display_name(&self) -> &str {
        let key = self.key();
        key.rsplit('/').find(|s| !s.is_empty()).unwrap_or(key)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            TransferDescriptor::Single { .. } => "single",
            TransferDescriptor::Multipart { .. } => "multipart",
            TransferDescriptor::Failed { .. } => "failed",
        }
    }
}

/// Error body returned by the presign service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Number of parts needed for `size_bytes` at `part_size` bytes per part
pub fn part_count(size_bytes: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    size_bytes.div_ceil(part_size)
}

/// Byte range covered by a 1-based part number
pub fn part_range(part_number: u32, part_size: u64, total_size: u64) -> Range<u64> {
    let index = u64::from(part_number.saturating_sub(1));
    let start = index.saturating_mul(part_size).min(total_size);
    let end = start.saturating_add(part_size).min(total_size);
    start..end
}

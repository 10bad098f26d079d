//! In-memory record of multipart uploads issued by this process.
//!
//! Lets the completion coordinator check a finalize request against the part
//! count that was actually issued. Nothing here is persisted; after a restart
//! the coordinator falls back to structural receipt checks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// A multipart upload waiting for its finalize call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMultipart {
    pub key: String,
    pub part_count: u32,
    pub expires_at: Instant,
}

/// Upload id -> issued multipart upload
#[derive(Debug, Default)]
pub struct MultipartRegistry {
    entries: Mutex<HashMap<String, PendingMultipart>>,
}

impl MultipartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember an issued upload for `retention`
    pub fn record(&self, upload_id: &str, key: &str, part_count: u32, retention: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::evict_expired(&mut entries, now);
        entries.insert(
            upload_id.to_string(),
            PendingMultipart {
                key: key.to_string(),
                part_count,
                expires_at: now + retention,
            },
        );
    }

    /// Look up a live entry
    pub fn get(&self, upload_id: &str) -> Option<PendingMultipart> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(upload_id)
            .filter(|entry| entry.expires_at > now)
            .cloned()
    }

    /// Forget an upload once it has been finalized or aborted
    pub fn remove(&self, upload_id: &str) -> Option<PendingMultipart> {
        self.entries.lock().remove(upload_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(entries: &mut HashMap<String, PendingMultipart>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted expired multipart registry entries");
        }
    }
}

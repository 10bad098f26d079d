//! Scriptable fakes for the transport and API seams.

use crate::api::UploadApi;
use crate::error::{ApiError, TransferError};
use crate::source::PartBody;
use crate::transport::{ObjectTransport, ProgressFn, PutOutcome};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use upload_protocol::{
    CompleteMultipartRequest, CompleteMultipartResponse, IssueRequest, IssueResponse,
};

/// One PUT seen by [`FakeTransport`]
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub url: String,
    pub len: usize,
    pub content_type: Option<String>,
}

/// Transport that answers from a script instead of the network
#[derive(Default)]
pub struct FakeTransport {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    without_etag: bool,
    puts: Mutex<Vec<RecordedPut>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    held_bytes: AtomicUsize,
    peak_held_bytes: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the response for `url` for `delay`
    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    /// Answer `url` with a 500
    pub fn fail(mut self, url: impl Into<String>) -> Self {
        self.failures.insert(url.into());
        self
    }

    /// Omit the ETag header from every response
    pub fn without_etag(mut self) -> Self {
        self.without_etag = true;
        self
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Most body bytes buffered at once across all concurrent PUTs
    pub fn peak_held_bytes(&self) -> usize {
        self.peak_held_bytes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectTransport for FakeTransport {
    async fn put(
        &self,
        url: &str,
        body: PartBody,
        content_type: Option<&str>,
        progress: ProgressFn,
    ) -> Result<PutOutcome, TransferError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Drain the body like a socket would, one chunk held at a time
        let mut stream = body.into_stream();
        let mut sent = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let held = self.held_bytes.fetch_add(chunk.len(), Ordering::SeqCst) + chunk.len();
            self.peak_held_bytes.fetch_max(held, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.held_bytes.fetch_sub(chunk.len(), Ordering::SeqCst);

            sent += chunk.len();
            progress(sent as u64);
        }

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.puts.lock().push(RecordedPut {
            url: url.to_string(),
            len: sent,
            content_type: content_type.map(str::to_string),
        });

        if self.failures.contains(url) {
            return Err(TransferError::Status {
                status: 500,
                body: "InternalError".to_string(),
            });
        }

        Ok(PutOutcome {
            etag: (!self.without_etag).then(|| format!("\"etag-{}\"", url)),
        })
    }
}

/// Presign service stand-in
#[derive(Default)]
pub struct FakeApi {
    issue_response: Mutex<Option<IssueResponse>>,
    reject_finalize: bool,
    completions: Mutex<Vec<CompleteMultipartRequest>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue_response(self, response: IssueResponse) -> Self {
        *self.issue_response.lock() = Some(response);
        self
    }

    /// Answer every finalize with a 400
    pub fn rejecting_finalize(mut self) -> Self {
        self.reject_finalize = true;
        self
    }

    pub fn completions(&self) -> Vec<CompleteMultipartRequest> {
        self.completions.lock().clone()
    }
}

#[async_trait]
impl UploadApi for FakeApi {
    async fn issue(&self, _request: &IssueRequest) -> Result<IssueResponse, ApiError> {
        self.issue_response
            .lock()
            .clone()
            .ok_or_else(|| ApiError::Status {
                endpoint: "/api/v1/uploads/presign".to_string(),
                status: 500,
                message: "Object store is not configured (CONFIGURATION_ERROR)".to_string(),
            })
    }

    async fn complete_multipart(
        &self,
        request: &CompleteMultipartRequest,
    ) -> Result<CompleteMultipartResponse, ApiError> {
        self.completions.lock().push(request.clone());
        if self.reject_finalize {
            return Err(ApiError::Status {
                endpoint: "/api/v1/uploads/complete".to_string(),
                status: 502,
                message: "InvalidPart (STORE_ERROR)".to_string(),
            });
        }
        Ok(CompleteMultipartResponse {
            key: request.key.clone(),
        })
    }
}

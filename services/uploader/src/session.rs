//! Batch orchestration: issue descriptors, register tasks, run every
//! transfer concurrently, then report once the whole batch has settled.

use crate::api::UploadApi;
use crate::config::ClientConfig;
use crate::engine::TransferEngine;
use crate::error::ApiError;
use crate::source::{find_source, LocalFile};
use crate::tracker::SessionTracker;
use crate::transport::ObjectTransport;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use upload_protocol::{FileSpec, IssueRequest, TransferDescriptor};

/// Keys of a settled batch, split by result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Called once every transfer in a batch is done or failed.
/// Errors are logged by the session and never reach task state.
#[async_trait]
pub trait SettledHandler: Send + Sync {
    async fn on_all_settled(&self, outcome: &BatchOutcome) -> anyhow::Result<()>;
}

/// Closure-based settled handler
pub struct FnSettled<F>
where
    F: Fn(&BatchOutcome) -> anyhow::Result<()> + Send + Sync,
{
    handler: F,
}

impl<F> FnSettled<F>
where
    F: Fn(&BatchOutcome) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> SettledHandler for FnSettled<F>
where
    F: Fn(&BatchOutcome) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_all_settled(&self, outcome: &BatchOutcome) -> anyhow::Result<()> {
        (self.handler)(outcome)
    }
}

/// One upload session: a tracker plus the machinery that feeds it
pub struct UploadSession {
    api: Arc<dyn UploadApi>,
    engine: TransferEngine,
}

impl UploadSession {
    pub fn new(
        api: Arc<dyn UploadApi>,
        transport: Arc<dyn ObjectTransport>,
        config: &ClientConfig,
    ) -> Self {
        let tracker = SessionTracker::new(config.auto_hide_delay());
        let engine = TransferEngine::new(transport, api.clone(), tracker)
            .with_part_concurrency(config.part_concurrency());
        Self { api, engine }
    }

    pub fn tracker(&self) -> &SessionTracker {
        self.engine.tracker()
    }

    /// Ask the presign service for descriptors, then upload every file.
    /// Issuance failures are returned; transfer failures only show up in
    /// task state and the outcome.
    #[instrument(skip(self, files, handler), fields(files = files.len()))]
    pub async fn upload_files(
        &self,
        owner_id: &str,
        group_id: &str,
        files: &[LocalFile],
        handler: &dyn SettledHandler,
    ) -> Result<BatchOutcome, ApiError> {
        let request = IssueRequest {
            owner_id: owner_id.to_string(),
            group_id: group_id.to_string(),
            files: files
                .iter()
                .map(|f| FileSpec::new(&f.name, &f.content_type, f.source.len()))
                .collect(),
        };

        let response = self.api.issue(&request).await?;
        info!(
            bucket = %response.bucket,
            uploads = response.uploads.len(),
            expires_at = %response.expires_at,
            "Descriptors issued"
        );

        Ok(self.queue_uploads(files, &response.uploads, handler).await)
    }

    /// Register a task per descriptor, run all transfers concurrently and
    /// invoke `handler` exactly once after they settle
    pub async fn queue_uploads(
        &self,
        files: &[LocalFile],
        descriptors: &[TransferDescriptor],
        handler: &dyn SettledHandler,
    ) -> BatchOutcome {
        if descriptors.is_empty() {
            debug!("No descriptors to upload");
            return BatchOutcome::default();
        }

        let tracker = self.tracker();
        for descriptor in descriptors {
            tracker.register(descriptor);
        }

        let transfers = descriptors.iter().map(|descriptor| {
            let source = find_source(files, descriptor.key());
            async move {
                let result = self.engine.run(descriptor, source).await;
                (descriptor.key().to_string(), result.is_ok())
            }
        });

        let mut outcome = BatchOutcome::default();
        for (key, succeeded) in join_all(transfers).await {
            if succeeded {
                outcome.completed.push(key);
            } else {
                outcome.failed.push(key);
            }
        }

        info!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            "Batch settled"
        );

        if let Err(e) = handler.on_all_settled(&outcome).await {
            warn!(error = %e, "Settled handler failed");
        }

        outcome
    }
}

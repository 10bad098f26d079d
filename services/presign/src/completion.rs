use crate::error::FinalizeError;
use crate::object_store::{resolve_location, ObjectStore};
use crate::registry::MultipartRegistry;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use upload_protocol::{
    normalize_receipts, validate_receipts, CompleteMultipartRequest, CompleteMultipartResponse,
};

/// Finalizes multipart uploads from the receipts a client collected
pub struct CompletionCoordinator {
    store: Arc<dyn ObjectStore>,
    registry: Arc<MultipartRegistry>,
}

impl CompletionCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<MultipartRegistry>) -> Self {
        Self { store, registry }
    }

    /// Normalize, check, and submit the receipts for one upload.
    ///
    /// Receipts must cover every part 1..N exactly once. N comes from the
    /// registry when this process issued the upload.
    #[instrument(skip(self, request), fields(key = %request.key, upload_id = %request.upload_id))]
    pub async fn complete(
        &self,
        request: &CompleteMultipartRequest,
    ) -> Result<CompleteMultipartResponse, FinalizeError> {
        resolve_location(self.store.as_ref()).map_err(FinalizeError::Configuration)?;

        let pending = self.registry.get(&request.upload_id);
        if let Some(ref pending) = pending {
            if pending.key != request.key {
                metrics::counter!("presign_multipart_rejected_total").increment(1);
                return Err(FinalizeError::KeyMismatch {
                    upload_id: request.upload_id.clone(),
                    expected: pending.key.clone(),
                    received: request.key.clone(),
                });
            }
        }

        let parts = normalize_receipts(&request.parts);
        if let Err(e) = validate_receipts(&parts, pending.as_ref().map(|p| p.part_count)) {
            warn!(error = %e, "Rejecting finalize request");
            metrics::counter!("presign_multipart_rejected_total").increment(1);
            return Err(e.into());
        }

        if parts.iter().any(|p| p.etag.is_empty()) {
            warn!("Finalizing with parts that have no integrity tag");
        }

        self.store
            .complete_multipart_upload(&request.key, &request.upload_id, &parts)
            .await
            .map_err(|e| {
                metrics::counter!("presign_multipart_rejected_total").increment(1);
                FinalizeError::from(e)
            })?;

        self.registry.remove(&request.upload_id);
        metrics::counter!("presign_multipart_completed_total").increment(1);

        info!(parts = parts.len(), "Multipart upload completed");

        Ok(CompleteMultipartResponse {
            key: request.key.clone(),
        })
    }
}

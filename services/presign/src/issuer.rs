use crate::config::UploadConfig;
use crate::error::IssueError;
use crate::object_store::{resolve_location, ObjectStore};
use crate::registry::MultipartRegistry;
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use upload_protocol::{part_count, FileSpec, IssueRequest, IssueResponse, PartUrl, TransferDescriptor};

/// How long a multipart upload stays finalizable in the registry after its URLs expire
const REGISTRY_GRACE: Duration = Duration::from_secs(3600);

/// Issues pre-authorized transfer descriptors for batches of files
///
/// Decides per file between a single PUT and a multipart upload:
/// - Files up to the single-put threshold get one presigned PUT URL
/// - Larger files get a multipart upload with one presigned URL per part
///
/// All signing for a batch runs concurrently.
pub struct DescriptorIssuer {
    store: Arc<dyn ObjectStore>,
    registry: Arc<MultipartRegistry>,
    config: UploadConfig,
}

impl DescriptorIssuer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<MultipartRegistry>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Issue one descriptor per file, preserving request order
    #[instrument(
        skip(self, request),
        fields(owner_id = %request.owner_id, group_id = %request.group_id, files = request.files.len())
    )]
    pub async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, IssueError> {
        let location = resolve_location(self.store.as_ref()).map_err(IssueError::Configuration)?;

        validate_segment("ownerId", &request.owner_id)?;
        validate_segment("groupId", &request.group_id)?;

        if request.files.len() > self.config.max_files_per_batch {
            return Err(IssueError::BatchTooLarge {
                count: request.files.len(),
                max: self.config.max_files_per_batch,
            });
        }

        let mut names = HashSet::with_capacity(request.files.len());
        for file in &request.files {
            validate_file_name(&file.name)?;
            // Two entries with one name would race for the same object key
            if !names.insert(file.name.as_str()) {
                return Err(IssueError::InvalidRequest(format!(
                    "duplicate file name {:?}",
                    file.name
                )));
            }
        }

        self.ensure_directory_markers(&request.owner_id, &request.group_id)
            .await;

        let expiry = self.config.presigned_url_expiry();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expiry).unwrap_or_else(|_| chrono::Duration::zero());

        let results = join_all(
            request
                .files
                .iter()
                .map(|file| self.issue_one(&request.owner_id, &request.group_id, file, expiry)),
        )
        .await;

        if self.config.fail_batch_on_signing_error && results.iter().any(|r| r.is_err()) {
            return Err(self.discard_batch(results).await);
        }

        let mut uploads = Vec::with_capacity(results.len());
        for (file, result) in request.files.iter().zip(results) {
            let descriptor = match result {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Issuing descriptor failed, isolating file");
                    metrics::counter!("presign_signing_failures_total").increment(1);
                    TransferDescriptor::Failed {
                        key: self.object_key(&request.owner_id, &request.group_id, &file.name),
                        error: e.to_string(),
                    }
                }
            };
            metrics::counter!("presign_descriptors_issued_total", "mode" => descriptor.mode())
                .increment(1);
            uploads.push(descriptor);
        }

        info!(uploads = uploads.len(), "Issued transfer descriptors");

        Ok(IssueResponse {
            bucket: location.bucket,
            region: location.region,
            uploads,
            expires_at,
        })
    }

    /// Object key for an uploaded file
    pub fn object_key(&self, owner_id: &str, group_id: &str, name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            owner_id, group_id, self.config.upload_prefix, name
        )
    }

    async fn issue_one(
        &self,
        owner_id: &str,
        group_id: &str,
        file: &FileSpec,
        expiry: Duration,
    ) -> Result<TransferDescriptor, IssueError> {
        let key = self.object_key(owner_id, group_id, &file.name);

        if file.size_bytes <= self.config.single_put_threshold_bytes {
            let url = self
                .store
                .presign_put(&key, &file.content_type, expiry)
                .await
                .map_err(|source| IssueError::Signing {
                    key: key.clone(),
                    source,
                })?;

            return Ok(TransferDescriptor::Single {
                key,
                url,
                content_type: file.content_type.clone(),
            });
        }

        let part_size = self.config.part_size_bytes;
        let parts = part_count(file.size_bytes, part_size);
        if parts > self.config.max_parts_per_upload || parts > u64::from(u32::MAX) {
            return Err(IssueError::TooManyParts {
                key,
                parts,
                max: self.config.max_parts_per_upload,
            });
        }
        let parts = parts as u32;

        let upload_id = self
            .store
            .create_multipart_upload(&key, &file.content_type)
            .await
            .map_err(|source| IssueError::Signing {
                key: key.clone(),
                source,
            })?;

        let signed = {
            let key = &key;
            let upload_id = &upload_id;
            try_join_all((1..=parts).map(|part_number| async move {
                self.store
                    .presign_upload_part(key, upload_id, part_number, expiry)
                    .await
                    .map(|url| PartUrl { part_number, url })
            }))
            .await
        };

        let part_urls = match signed {
            Ok(part_urls) => part_urls,
            Err(source) => {
                self.abort_quietly(&key, &upload_id).await;
                return Err(IssueError::Signing { key, source });
            }
        };

        self.registry
            .record(&upload_id, &key, parts, expiry + REGISTRY_GRACE);

        debug!(key = %key, upload_id = %upload_id, parts = parts, "Multipart upload issued");

        Ok(TransferDescriptor::Multipart {
            key,
            upload_id,
            part_size,
            part_urls,
        })
    }

    /// Best-effort creation of folder placeholders; failures never abort the batch
    async fn ensure_directory_markers(&self, owner_id: &str, group_id: &str) {
        let keys = directory_marker_keys(owner_id, group_id, &self.config.marker_prefixes);

        join_all(keys.iter().map(|key| async move {
            if let Err(e) = self.store.put_directory_marker(key).await {
                warn!(key = %key, error = %e, "Failed to write directory marker");
            }
        }))
        .await;
    }

    /// Abort every multipart upload created for a failed batch and return the first error
    async fn discard_batch(
        &self,
        results: Vec<Result<TransferDescriptor, IssueError>>,
    ) -> IssueError {
        let mut first_error = None;
        let mut created = Vec::new();

        for result in results {
            match result {
                Ok(TransferDescriptor::Multipart { key, upload_id, .. }) => {
                    created.push((key, upload_id));
                }
                Ok(_) => {}
                Err(e) => {
                    metrics::counter!("presign_signing_failures_total").increment(1);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        join_all(created.iter().map(|(key, upload_id)| async move {
            self.registry.remove(upload_id);
            self.abort_quietly(key, upload_id).await;
        }))
        .await;

        first_error.unwrap_or(IssueError::InvalidRequest(
            "batch discarded without a recorded error".to_string(),
        ))
    }

    async fn abort_quietly(&self, key: &str, upload_id: &str) {
        if let Err(e) = self.store.abort_multipart_upload(key, upload_id).await {
            warn!(key = %key, upload_id = %upload_id, error = %e, "Failed to abort multipart upload");
        }
    }
}

/// Folder placeholder keys for an owner/group pair
pub fn directory_marker_keys(owner_id: &str, group_id: &str, prefixes: &[String]) -> Vec<String> {
    let mut keys = vec![
        format!("{}/", owner_id),
        format!("{}/{}/", owner_id, group_id),
    ];
    keys.extend(
        prefixes
            .iter()
            .map(|prefix| format!("{}/{}/{}/", owner_id, group_id, prefix)),
    );
    keys
}

/// Owner and group ids become single key segments
fn validate_segment(field: &str, value: &str) -> Result<(), IssueError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(IssueError::InvalidRequest(format!("{} is empty or invalid", field)));
    }
    if value.contains('/') || value.chars().any(char::is_control) {
        return Err(IssueError::InvalidRequest(format!(
            "{} must be a single key segment",
            field
        )));
    }
    Ok(())
}

/// File names must be safe to embed at the end of an object key
fn validate_file_name(name: &str) -> Result<(), IssueError> {
    let invalid = |reason: &str| IssueError::InvalidFile {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('/') {
        return Err(invalid("name must not start with '/'"));
    }
    if name.ends_with('/') {
        return Err(invalid("name must not end with '/'"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("name contains an empty or relative path segment"));
    }
    Ok(())
}

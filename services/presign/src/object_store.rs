use crate::config::S3Config;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use upload_protocol::{PartReceipt, DIRECTORY_CONTENT_TYPE};

/// Bucket and region the store writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub bucket: String,
    pub region: String,
}

/// Resolve the configured location, naming the first missing setting
pub fn resolve_location(store: &dyn ObjectStore) -> Result<StoreLocation, &'static str> {
    let region = store.region().ok_or("region")?;
    let bucket = store.bucket().ok_or("bucket")?;
    Ok(StoreLocation { bucket, region })
}

/// Operations the issuer and coordinator need from an S3-compatible store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Configured bucket, `None` when not configured
    fn bucket(&self) -> Option<String>;

    /// Configured region, `None` when not configured
    fn region(&self) -> Option<String>;

    /// Write a zero-byte folder placeholder
    async fn put_directory_marker(&self, key: &str) -> Result<(), StoreError>;

    /// Pre-authorized PUT URL for a whole object
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;

    /// Start a multipart upload and return its upload id
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Pre-authorized PUT URL for one part of a multipart upload
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> Result<String, StoreError>;

    /// Assemble the object from parts sorted ascending by part number
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> Result<(), StoreError>;

    /// Discard a multipart upload and its parts
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;
}

/// [`ObjectStore`] backed by the AWS SDK
pub struct S3Store {
    client: S3Client,
    bucket: Option<String>,
    region: Option<String>,
}

impl S3Store {
    /// Create a new S3 store client
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        // Static credentials only when both halves are present
        if let (Some(ref access_key), Some(ref secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "presign-service",
            ));
        }

        let aws_config = loader.load().await;
        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        match (&config.bucket, &config.region) {
            (Some(bucket), Some(region)) => {
                info!(bucket = %bucket, region = %region, "S3 store initialized");
            }
            _ => {
                warn!("S3 bucket or region not configured; issuance will fail until they are set");
            }
        }

        Self {
            client,
            bucket: config.bucket.clone().filter(|b| !b.is_empty()),
            region: config.region.clone().filter(|r| !r.is_empty()),
        }
    }

    fn bucket_name(&self) -> &str {
        self.bucket.as_deref().unwrap_or_default()
    }
}

fn presigning_config(expires_in: Duration) -> Result<PresigningConfig, StoreError> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StoreError::PresignConfig(e.to_string()))
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> Option<String> {
        self.bucket.clone()
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    #[instrument(skip(self))]
    async fn put_directory_marker(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(self.bucket_name())
            .key(key)
            .body(ByteStream::from_static(b""))
            .content_type(DIRECTORY_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| StoreError::request("PutObject", DisplayErrorContext(e).to_string()))?;

        debug!(key = %key, "Directory marker written");
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let presigned = self
            .client
            .put_object()
            .bucket(self.bucket_name())
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| {
                StoreError::request("PresignPutObject", DisplayErrorContext(e).to_string())
            })?;

        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self))]
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(self.bucket_name())
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StoreError::request("CreateMultipartUpload", DisplayErrorContext(e).to_string())
            })?;

        let upload_id = response
            .upload_id()
            .ok_or(StoreError::MissingUploadId)?
            .to_string();

        debug!(key = %key, upload_id = %upload_id, "Multipart upload created");
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let part_number = i32::try_from(part_number)
            .map_err(|_| StoreError::request("PresignUploadPart", "part number out of range"))?;

        let presigned = self
            .client
            .upload_part()
            .bucket(self.bucket_name())
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| {
                StoreError::request("PresignUploadPart", DisplayErrorContext(e).to_string())
            })?;

        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> Result<(), StoreError> {
        let completed_parts = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(self.bucket_name())
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| {
                StoreError::request("CompleteMultipartUpload", DisplayErrorContext(e).to_string())
            })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(self.bucket_name())
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                StoreError::request("AbortMultipartUpload", DisplayErrorContext(e).to_string())
            })?;

        Ok(())
    }
}

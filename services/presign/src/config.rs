use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the presign service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object store configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Upload policy
    #[serde(default)]
    pub upload: UploadConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration.
///
/// Bucket and region are optional here; issuing descriptors without them
/// fails with a configuration error instead of refusing to start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Config {
    /// Target bucket
    pub bucket: Option<String>,
    /// AWS region
    pub region: Option<String>,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Static access key; the default credential chain is used unless both keys are set
    pub access_key_id: Option<String>,
    /// Static secret key
    pub secret_access_key: Option<String>,
}

/// Upload policy for descriptor issuance
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Files up to this size get a single PUT URL (100MB default)
    #[serde(default = "default_single_put_threshold")]
    pub single_put_threshold_bytes: u64,
    /// Part size for multipart uploads in bytes (10MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Key segment under {owner}/{group}/ where uploads land
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    /// Folder markers created under {owner}/{group}/
    #[serde(default = "default_marker_prefixes")]
    pub marker_prefixes: Vec<String>,
    /// Maximum number of files per issue request
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    /// Maximum number of parts for one multipart upload
    #[serde(default = "default_max_parts_per_upload")]
    pub max_parts_per_upload: u64,
    /// Fail the whole batch when signing fails for one file
    #[serde(default)]
    pub fail_batch_on_signing_error: bool,
}

/// API configuration for the upload endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "presign-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_single_put_threshold() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_part_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_presigned_url_expiry_secs() -> u64 {
    900
}

fn default_upload_prefix() -> String {
    "raw_video".to_string()
}

fn default_marker_prefixes() -> Vec<String> {
    vec!["raw_video".to_string(), "split_video".to_string()]
}

fn default_max_files_per_batch() -> usize {
    100
}

fn default_max_parts_per_upload() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "presign-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/presign").required(false))
            .add_source(config::File::with_name("/etc/upload/presign").required(false))
            // Override with environment variables
            // PRESIGN__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("PRESIGN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make issuance impossible
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upload.part_size_bytes == 0 {
            anyhow::bail!("upload.part_size_bytes must be greater than zero");
        }
        if self.upload.upload_prefix.is_empty() || self.upload.upload_prefix.contains('/') {
            anyhow::bail!("upload.upload_prefix must be a single non-empty key segment");
        }
        Ok(())
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        self.upload.presigned_url_expiry()
    }
}

impl UploadConfig {
    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.presigned_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            single_put_threshold_bytes: default_single_put_threshold(),
            part_size_bytes: default_part_size(),
            presigned_url_expiry_secs: default_presigned_url_expiry_secs(),
            upload_prefix: default_upload_prefix(),
            marker_prefixes: default_marker_prefixes(),
            max_files_per_batch: default_max_files_per_batch(),
            max_parts_per_upload: default_max_parts_per_upload(),
            fail_batch_on_signing_error: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

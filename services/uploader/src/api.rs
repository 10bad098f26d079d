//! Client for the presign service's upload endpoints.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use upload_protocol::{
    CompleteMultipartRequest, CompleteMultipartResponse, ErrorResponse, IssueRequest,
    IssueResponse,
};

/// Descriptor issuance and multipart finalization, as seen from the client
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Request transfer descriptors for a batch of files
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, ApiError>;

    /// Finalize a multipart transfer
    async fn complete_multipart(
        &self,
        request: &CompleteMultipartRequest,
    ) -> Result<CompleteMultipartResponse, ApiError>;
}

/// [`UploadApi`] over HTTP
#[derive(Clone)]
pub struct HttpUploadApi {
    client: Client,
    base_url: String,
}

impl HttpUploadApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let endpoint = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Request {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Prefer the service's structured error message when present
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| format!("{} ({})", e.error, e.code))
                .unwrap_or(text);
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        response.json::<R>().await.map_err(|e| ApiError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl UploadApi for HttpUploadApi {
    #[instrument(skip(self, request), fields(files = request.files.len()))]
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, ApiError> {
        let response: IssueResponse = self.post_json("/api/v1/uploads/presign", request).await?;
        debug!(uploads = response.uploads.len(), "Received transfer descriptors");
        Ok(response)
    }

    #[instrument(skip(self, request), fields(key = %request.key, parts = request.parts.len()))]
    async fn complete_multipart(
        &self,
        request: &CompleteMultipartRequest,
    ) -> Result<CompleteMultipartResponse, ApiError> {
        self.post_json("/api/v1/uploads/complete", request).await
    }
}

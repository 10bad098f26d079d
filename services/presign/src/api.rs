use crate::completion::CompletionCoordinator;
use crate::config::ApiConfig;
use crate::error::{FinalizeError, IssueError};
use crate::issuer::DescriptorIssuer;
use crate::object_store::{resolve_location, ObjectStore};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use upload_protocol::{
    CompleteMultipartRequest, CompleteMultipartResponse, ErrorResponse, IssueRequest,
    IssueResponse,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub issuer: Arc<DescriptorIssuer>,
    pub coordinator: Arc<CompletionCoordinator>,
}

/// Error returned by upload handlers
#[derive(Debug)]
pub enum ApiError {
    Issue(IssueError),
    Finalize(FinalizeError),
}

impl From<IssueError> for ApiError {
    fn from(e: IssueError) -> Self {
        ApiError::Issue(e)
    }
}

impl From<FinalizeError> for ApiError {
    fn from(e: FinalizeError) -> Self {
        ApiError::Finalize(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Issue(IssueError::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Issue(IssueError::Signing { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Issue(_) => StatusCode::BAD_REQUEST,
            ApiError::Finalize(FinalizeError::Configuration(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Finalize(FinalizeError::Store(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Finalize(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> ErrorResponse {
        let (error, code) = match self {
            ApiError::Issue(e) => (e.to_string(), e.code()),
            ApiError::Finalize(e) => (e.to_string(), e.code()),
        };
        ErrorResponse {
            error,
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!(code = %body.code, error = %body.error, "Upload request failed");
        } else {
            warn!(code = %body.code, error = %body.error, "Upload request rejected");
        }
        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/uploads/presign", post(issue_uploads))
        .route("/api/v1/uploads/complete", post(complete_upload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "presign-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match resolve_location(state.store.as_ref()) {
        Ok(location) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "bucket": location.bucket,
                "region": location.region
            })),
        ),
        Err(missing) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "missing": missing
            })),
        ),
    }
}

/// Issue transfer descriptors for a batch of files
#[instrument(skip(state, request), fields(files = request.files.len()))]
async fn issue_uploads(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> Result<Json<IssueResponse>, ApiError> {
    let response = state.issuer.issue(&request).await?;
    Ok(Json(response))
}

/// Finalize a multipart upload
#[instrument(skip(state, request), fields(key = %request.key, parts = request.parts.len()))]
async fn complete_upload(
    State(state): State<AppState>,
    Json(request): Json<CompleteMultipartRequest>,
) -> Result<Json<CompleteMultipartResponse>, ApiError> {
    let response = state.coordinator.complete(&request).await?;
    Ok(Json(response))
}

/// Start the upload API server, stopping when `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

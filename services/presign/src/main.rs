use anyhow::{Context, Result};
use presign_service::api::{start_api_server, AppState};
use presign_service::{
    CompletionCoordinator, Config, DescriptorIssuer, MultipartRegistry, ObjectStore, S3Store,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting presign service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.s3).await);
    let registry = Arc::new(MultipartRegistry::new());

    let issuer = Arc::new(DescriptorIssuer::new(
        store.clone(),
        registry.clone(),
        config.upload.clone(),
    ));
    let coordinator = Arc::new(CompletionCoordinator::new(store.clone(), registry));

    let api_state = AppState {
        store,
        issuer,
        coordinator,
    };

    info!(
        single_put_threshold_bytes = config.upload.single_put_threshold_bytes,
        part_size_bytes = config.upload.part_size_bytes,
        url_expiry_secs = config.presigned_url_expiry().as_secs(),
        "Upload policy loaded"
    );

    start_api_server(api_state, &config.api, shutdown_signal()).await?;

    info!("Presign service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

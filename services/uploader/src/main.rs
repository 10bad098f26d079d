//! Uploader - push local media files through the presign service
//!
//! Requests transfer descriptors for the given files, uploads them
//! concurrently, logs per-file progress, and optionally notifies a status
//! endpoint once the batch has settled.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use upload_client::prelude::*;
use upload_client::StatusNotifier;

fn print_usage() {
    println!("Usage: uploader <owner-id> <group-id> <file>...");
    println!();
    println!("Environment variables:");
    println!("  UPLOADER__SERVICE_URL          - Presign service base URL (default: http://localhost:8080)");
    println!("  UPLOADER__STATUS_URL           - Endpoint notified when the batch settles");
    println!("  UPLOADER__MAX_CONCURRENT_PARTS - Parts per file in flight (default: all)");
    println!("  UPLOADER__PROGRESS_CHUNK_BYTES - Progress granularity (default: 65536)");
    println!("  UPLOADER__LOG_LEVEL            - Log level (default: info)");
}

async fn open_local_file(path: &str) -> Result<LocalFile> {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path))?
        .to_string();

    let source = FileSource::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path))?;

    let content_type = content_type_for(&name);
    Ok(LocalFile::new(name, content_type, Arc::new(source)))
}

/// Log status changes at info and progress at debug until the session closes
async fn log_progress(mut events: watch::Receiver<SessionSnapshot>) {
    let mut last_status: HashMap<String, TaskStatus> = HashMap::new();

    while events.changed().await.is_ok() {
        let snapshot = events.borrow_and_update().clone();
        for task in &snapshot.tasks {
            let previous = last_status.insert(task.id.clone(), task.status);
            if previous != Some(task.status) {
                info!(
                    file = %task.display_name,
                    status = ?task.status,
                    progress = task.progress_percent,
                    "Task status"
                );
            } else {
                debug!(file = %task.display_name, progress = task.progress_percent, "Progress");
            }
        }
        if !snapshot.visible {
            debug!("Session hidden");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClientConfig::load()?;

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        print_usage();
        return Ok(());
    }
    let owner_id = &args[1];
    let group_id = &args[2];

    let mut files = Vec::with_capacity(args.len() - 3);
    for path in &args[3..] {
        files.push(open_local_file(path).await?);
    }

    info!(
        service_url = %config.service_url,
        files = files.len(),
        "Starting upload"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let api = Arc::new(HttpUploadApi::new(client.clone(), &config.service_url));
    let transport = Arc::new(HttpTransport::new(client.clone(), config.progress_chunk_bytes));
    let session = UploadSession::new(api, transport, &config);

    let progress_logger = tokio::spawn(log_progress(session.tracker().subscribe()));

    let handler: Box<dyn SettledHandler> = match &config.status_url {
        Some(url) => Box::new(StatusNotifier::new(client, url, group_id)),
        None => Box::new(FnSettled::new(|_: &BatchOutcome| Ok(()))),
    };

    let outcome = session
        .upload_files(owner_id, group_id, &files, handler.as_ref())
        .await
        .context("Failed to issue upload descriptors")?;

    progress_logger.abort();

    for key in &outcome.completed {
        info!(key = %key, "Uploaded");
    }
    for key in &outcome.failed {
        warn!(key = %key, "Upload failed");
    }

    if !outcome.is_success() {
        bail!(
            "{} of {} uploads failed",
            outcome.failed.len(),
            outcome.failed.len() + outcome.completed.len()
        );
    }

    info!("All uploads complete");
    Ok(())
}

//! Status-update callback for settled batches.

use crate::session::{BatchOutcome, SettledHandler};
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate<'a> {
    group_id: &'a str,
    keys: &'a [String],
    failed: &'a [String],
}

/// POSTs the keys of a settled batch to a status endpoint
pub struct StatusNotifier {
    client: Client,
    url: String,
    group_id: String,
}

impl StatusNotifier {
    pub fn new(client: Client, url: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            group_id: group_id.into(),
        }
    }
}

#[async_trait]
impl SettledHandler for StatusNotifier {
    #[instrument(skip(self, outcome), fields(url = %self.url))]
    async fn on_all_settled(&self, outcome: &BatchOutcome) -> anyhow::Result<()> {
        let update = StatusUpdate {
            group_id: &self.group_id,
            keys: &outcome.completed,
            failed: &outcome.failed,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&update)
            .send()
            .await
            .context("Failed to send status update")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Status endpoint returned {}", status);
        }

        info!(keys = outcome.completed.len(), "Status update sent");
        Ok(())
    }
}

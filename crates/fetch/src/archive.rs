use std::time::Duration;

use tracing::debug;

const AVAILABILITY_API: &str = "https://archive.org/wayback/available";

/// Wayback availability lookup. The snapshot itself is fetched by the
/// caller so that byte caps and content-type budgets still apply.
pub struct ArchiveClient {
    client: reqwest::Client,
}

impl ArchiveClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn latest_snapshot(&self, url: &str) -> Option<String> {
        let response = self
            .client
            .get(AVAILABILITY_API)
            .query(&[("url", url)])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        let closest = body.get("archived_snapshots")?.get("closest")?;
        if !closest.get("available")?.as_bool().unwrap_or(false) {
            return None;
        }
        let snapshot = closest.get("url")?.as_str()?.to_string();
        debug!(url, snapshot = %snapshot, "archive snapshot found");
        Some(snapshot)
    }
}

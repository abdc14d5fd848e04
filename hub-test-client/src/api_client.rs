use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};

/// Plain-HTTP probes against the relay server.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn check_health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach health endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Health check failed: {}", response.status());
        }

        let body = response.text().await.context("Failed to read health body")?;
        if body != "healthy" {
            anyhow::bail!("Unexpected health body: {}", body);
        }

        Ok(())
    }

    /// A plain GET on the socket path must be refused with 426 Upgrade Required.
    pub async fn check_upgrade_required(&self, socket_path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, socket_path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach socket path over plain HTTP")?;

        let status = response.status();
        if status != StatusCode::UPGRADE_REQUIRED {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Expected 426 from {}, got {} - Response: {}", url, status, body);
        }

        Ok(())
    }
}

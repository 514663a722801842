use crate::config::SourceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::PageSource;

/// Fetches the summary page over HTTP. One attempt per capture.
pub struct HttpClient {
    inner: reqwest::Client,
    url: String,
}

impl HttpClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let url = config.parsed_url()?;

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            url: url.to_string(),
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Bad status from {}", url))?;

        resp.text().await.context("Failed to read response body")
    }
}

#[async_trait]
impl PageSource for HttpClient {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_page(&self) -> Result<String> {
        self.get_text(&self.url).await
    }
}

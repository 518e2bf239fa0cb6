//! Shared HTTP client for notification channels and the version check

use anyhow::{Context, Result};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("volume-guard/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 15,
        }
    }
}

/// Thin wrapper over `reqwest` with status checking and context on errors
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// POST a JSON body, failing on non-success status
    pub async fn post_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to POST to {}", redact(url)))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", response.status(), redact(url));
        }
        Ok(())
    }

    /// GET and decode a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", response.status(), url);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode JSON from: {url}"))
    }
}

/// Strip the path so bot tokens and webhook secrets stay out of logs
fn redact(url: &str) -> String {
    match url.find("://").and_then(|scheme| url[scheme + 3..].find('/').map(|p| scheme + 3 + p)) {
        Some(path_start) => format!("{}/…", &url[..path_start]),
        None => url.to_string(),
    }
}

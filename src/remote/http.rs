//! HTTP fetcher resolving cache keys against a configured base URL.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use super::RemoteFetcher;
use crate::cache::Payload;
use crate::config::{Config, RemoteConfig};
use crate::error::FetchError;

/// HTTP fetcher resolving cache keys against a base URL.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpFetcher {
  pub fn new(remote: &RemoteConfig, token: Option<String>) -> Result<Self> {
    let base_url = Url::parse(&remote.base_url)
      .map_err(|e| eyre!("Invalid base URL {}: {}", remote.base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(remote.timeout_secs))
      .user_agent(concat!("cachewise/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// Build a fetcher from the loaded configuration and the token env var.
  pub fn from_config(config: &Config) -> Result<Self> {
    Self::new(&config.remote, Config::get_api_token())
  }

  /// Resolve a key into the request URL.
  ///
  /// Keys are treated as relative references, so a base URL without a
  /// trailing slash replaces its last path segment. A key that resolves to
  /// another scheme, host or port is rejected; the bearer token only goes
  /// to the configured origin.
  pub fn url_for(&self, key: &str) -> Result<Url, FetchError> {
    let url = self
      .base_url
      .join(key.trim_start_matches('/'))
      .map_err(|e| FetchError::Network(format!("Invalid key {}: {}", key, e)))?;

    if url.origin() != self.base_url.origin() {
      return Err(FetchError::Network(format!(
        "Key {} resolves outside {}",
        key,
        self.base_url.origin().ascii_serialization()
      )));
    }

    Ok(url)
  }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
  async fn fetch(&self, key: &str) -> Result<Payload, FetchError> {
    let url = self.url_for(key)?;

    let mut request = self.client.get(url.clone());
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| FetchError::Network(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
      tracing::debug!(%url, code = status.as_u16(), "remote returned non-success status");
      return Err(FetchError::HttpStatus {
        code: status.as_u16(),
      });
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Network(format!("Failed to read body from {}: {}", url, e)))?;

    // Non-JSON bodies are kept as a string value
    Ok(serde_json::from_slice(&body).unwrap_or_else(|_| {
      Payload::String(String::from_utf8_lossy(&body).into_owned())
    }))
  }
}

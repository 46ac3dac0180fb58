//! Document fetching behind a trait so resolution can run against HTTP
//! or canned bytes in tests.
//!
//! Failures are split into transient (worth a bounded retry) and
//! permanent (never retried): timeouts, connection errors and 5xx are
//! transient; 4xx and malformed URLs are permanent.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use xbrlkit_core::{Error, ResolverConfig, Result};

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher with per-request timeout and bounded retry on transient
/// failures.
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent("xbrlkit/0.1")
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            retries: config.fetch_retries,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                Error::FetchTransient {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                Error::FetchPermanent {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::FetchTransient {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::FetchPermanent {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        let bytes = response.bytes().await.map_err(|e| Error::FetchTransient {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => {
                    debug!(url, size = bytes.len(), "fetched");
                    return Ok(bytes);
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "transient fetch failure, retrying");
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-memory fetcher for tests: canned documents keyed by URL, optional
/// scripted failures, and a per-URL fetch counter.
#[derive(Default)]
pub struct StaticFetcher {
    documents: HashMap<String, Vec<u8>>,
    transient_failures: HashMap<String, String>,
    counts: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, url: &str, content: &str) -> Self {
        self.documents.insert(url.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Make `url` fail transiently with `reason` on every fetch.
    pub fn with_transient_failure(mut self, url: &str, reason: &str) -> Self {
        self.transient_failures
            .insert(url.to_string(), reason.to_string());
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.counts.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        *self.counts.lock().entry(url.to_string()).or_insert(0) += 1;
        if let Some(reason) = self.transient_failures.get(url) {
            return Err(Error::FetchTransient {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| Error::FetchPermanent {
                url: url.to_string(),
                reason: "not found".into(),
            })
    }
}

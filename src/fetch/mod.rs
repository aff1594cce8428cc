//! Page retrieval
//!
//! The explorer owns one long-lived [`Fetcher`] for the whole run and calls
//! [`Fetcher::shutdown`] on every exit path.

use crate::{OdysseusError, Result};
use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::Duration;
use tracing::debug;

const MAX_REDIRECTS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bodies larger than this are cut before extraction
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; odysseus/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Raw response for one URL
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL. Failures are errors, never an empty page.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;

    /// Release the backend. Called once when the run ends.
    async fn shutdown(&self) {}
}

/// Plain HTTP fetcher
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OdysseusError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    /// Cap on body bytes kept per response.
    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let mut response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/pdf;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OdysseusError::Fetch(format!("timeout fetching {url}"))
                } else {
                    OdysseusError::Fetch(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OdysseusError::Fetch(format!("{url} returned {status}")));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| OdysseusError::Fetch(format!("{url}: body read failed: {e}")))?
        {
            let room = self.max_body_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!("Body of {} cut at {} bytes", url, self.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            "Fetched {} ({} bytes, {})",
            final_url,
            body.len(),
            content_type.as_deref().unwrap_or("unknown type")
        );

        Ok(FetchedPage {
            final_url,
            content_type,
            body,
        })
    }

    async fn shutdown(&self) {
        debug!("HTTP fetcher released");
    }
}

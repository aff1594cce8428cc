//! Brave Search API

use super::{SearchProvider, SearchResult};
use crate::reading::compact_ws;
use crate::{OdysseusError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
/// The API rejects larger pages
const MAX_COUNT: usize = 20;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

pub struct BraveSearch {
    client: Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OdysseusError::Auth("empty Brave API key".to_string()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OdysseusError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, api_key })
    }

    async fn try_search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let count = count.clamp(1, MAX_COUNT).to_string();
        let response = self
            .client
            .get(ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| OdysseusError::Fetch(format!("Brave request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(OdysseusError::Fetch(format!("Brave API error {status}: {body}")));
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| OdysseusError::Fetch(format!("Brave response malformed: {e}")))?;
        Ok(into_results(parsed))
    }
}

fn into_results(response: BraveResponse) -> Vec<SearchResult> {
    response
        .web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.starts_with("http"))
        .map(|r| SearchResult {
            title: strip_markup(&r.title),
            url: r.url,
            snippet: strip_markup(&r.description),
        })
        .collect()
}

/// Brave highlights matches with `<strong>`
fn strip_markup(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    compact_ws(&fragment.root_element().text().collect::<Vec<_>>().join(""))
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, count: usize) -> Vec<SearchResult> {
        match self.try_search(query, count).await {
            Ok(results) => {
                debug!("Brave returned {} results for {:?}", results.len(), query);
                results
            }
            Err(e) => {
                warn!("Search for {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

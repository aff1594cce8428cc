//! DuckDuckGo HTML endpoint. Needs no API key.

use super::{SearchProvider, SearchResult};
use crate::reading::compact_ws;
use crate::{urls, OdysseusError, Result};
use async_trait::async_trait;
use reqwest::{redirect, Client};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("odysseus/", env!("CARGO_PKG_VERSION"));

pub struct DuckDuckGoSearch {
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OdysseusError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn try_search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| OdysseusError::Fetch(format!("DuckDuckGo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OdysseusError::Fetch(format!("DuckDuckGo returned {status}")));
        }
        let html = response
            .text()
            .await
            .map_err(|e| OdysseusError::Fetch(format!("DuckDuckGo body read failed: {e}")))?;

        if is_bot_challenge(&html) {
            return Err(OdysseusError::Fetch("DuckDuckGo bot check triggered".to_string()));
        }
        Ok(parse_results(&html, count))
    }
}

fn is_bot_challenge(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    lower.contains("anomaly-modal") || lower.contains("challenge-form")
}

fn text_of(el: ElementRef<'_>) -> String {
    compact_ws(&el.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn parse_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(container_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse("a.result__snippet, div.result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for container in document.select(&container_sel) {
        if out.len() >= limit {
            break;
        }
        let Some(anchor) = container.select(&title_sel).next() else {
            continue;
        };
        let href = anchor.value().attr("href").unwrap_or("");
        let Some(url) = result_href(href) else {
            continue;
        };
        if !seen.insert(urls::normalize(&url)) {
            continue;
        }

        out.push(SearchResult {
            title: text_of(anchor),
            url,
            snippet: container
                .select(&snippet_sel)
                .next()
                .map(text_of)
                .unwrap_or_default(),
        });
    }

    out
}

/// Resolve a result link, unwrapping `/l/?uddg=` redirects.
fn result_href(href: &str) -> Option<String> {
    let trimmed = href.trim();
    let absolute = if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else if trimmed.starts_with('/') {
        format!("https://duckduckgo.com{}", trimmed)
    } else {
        trimmed.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    let is_redirect = parsed
        .host_str()
        .is_some_and(|h| h.to_ascii_lowercase().ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");

    if is_redirect {
        // query_pairs yields the decoded value
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.trim().to_string())?;
        return (target.starts_with("http://") || target.starts_with("https://")).then_some(target);
    }

    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, count: usize) -> Vec<SearchResult> {
        match self.try_search(query, count).await {
            Ok(results) => {
                debug!("DuckDuckGo returned {} results for {:?}", results.len(), query);
                results
            }
            Err(e) => {
                warn!("Search for {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = r##"<html><body>
        <div class="result results_links">
          <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FDeontic_logic&amp;rut=abc">Deontic  logic - Wikipedia</a></h2>
          <a class="result__snippet" href="#">Deontic logic is the field of <b>philosophical</b> logic</a>
        </div>
        <div class="result">
          <h2><a class="result__a" href="https://plato.stanford.edu/entries/logic-deontic/">SEP</a></h2>
        </div>
        <div class="result">
          <h2><a class="result__a" href="https://en.wikipedia.org/wiki/Deontic_logic#dup">Duplicate</a></h2>
        </div>
        </body></html>"##;

    #[test]
    fn test_parse_results() {
        let results = parse_results(RESULTS, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://en.wikipedia.org/wiki/Deontic_logic");
        assert_eq!(results[0].title, "Deontic logic - Wikipedia");
        assert_eq!(results[0].snippet, "Deontic logic is the field of philosophical logic");
        assert_eq!(results[1].url, "https://plato.stanford.edu/entries/logic-deontic/");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_results_limit() {
        assert_eq!(parse_results(RESULTS, 1).len(), 1);
        assert!(parse_results("<html></html>", 10).is_empty());
    }

    #[test]
    fn test_result_href() {
        assert_eq!(
            result_href("/l/?uddg=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc").as_deref(),
            Some("https://example.com/a?b=c")
        );
        assert_eq!(result_href("/l/?kh=1"), None);
        assert_eq!(result_href("javascript:void(0)"), None);
    }

    #[test]
    fn test_bot_challenge() {
        assert!(is_bot_challenge("<div class=\"anomaly-modal__title\">"));
        assert!(!is_bot_challenge(RESULTS));
    }
}

//! Web search adapters

mod brave;
mod duckduckgo;

pub use brave::BraveSearch;
pub use duckduckgo::DuckDuckGoSearch;

use async_trait::async_trait;
use serde::Deserialize;

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A search backend. Failures are logged by the implementation and yield no results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, count: usize) -> Vec<SearchResult>;
}

/// Which search backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Brave,
    #[value(name = "duckduckgo")]
    #[serde(rename = "duckduckgo")]
    DuckDuckGo,
}

impl std::fmt::Display for SearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Brave => write!(f, "brave"),
            Self::DuckDuckGo => write!(f, "duckduckgo"),
        }
    }
}

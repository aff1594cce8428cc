//! Odysseus - autonomous browse-and-learn agent
//!
//! Starting from a concept or URL, Odysseus repeatedly:
//! - Fetches a page or PDF and extracts its text and links
//! - Asks a language model to reflect on it and stores the reflection
//! - Asks the model whether to follow a link or search for something new
//! - Never fetches the same (normalized) URL twice

pub mod agent;
pub mod console;
pub mod decision;
pub mod fetch;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod reading;
pub mod search;
pub mod settings;
pub mod urls;

pub use agent::{ExplorationState, Explorer, Outcome, SessionReport, SuggestionMode, Target};
pub use decision::{Decision, DecisionProtocol, Resolution, Tier};
pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use llm::{ChatClient, CompletionRequest, LanguageModel};
pub use memory::{MemoryRecord, MemoryStore};
pub use search::{SearchProvider, SearchResult};

use std::path::PathBuf;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default number of pages explored per run
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Configuration for an exploration run
#[derive(Debug, Clone)]
pub struct OdysseusConfig {
    /// Model identifier sent to the inference API
    pub model: String,

    /// Maximum number of loop passes
    pub max_pages: u32,

    /// Root directory under which the per-run directory is created
    pub log_dir: PathBuf,

    /// Token count above which page text is truncated
    pub token_limit: usize,

    /// Character cut applied when the token limit is exceeded
    pub char_cut: usize,

    /// Maximum number of links kept per page
    pub link_limit: usize,

    /// Number of search results requested per query
    pub search_count: usize,

    /// Sampling temperature for reflections and decisions
    pub temperature: f32,

    /// Every N passes a new direction is suggested (0 disables)
    pub direction_interval: u32,

    /// How suggested new directions are handled
    pub suggestions: SuggestionMode,
}

impl OdysseusConfig {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            log_dir,
            token_limit: reading::DEFAULT_TOKEN_LIMIT,
            char_cut: reading::DEFAULT_CHAR_CUT,
            link_limit: reading::DEFAULT_LINK_LIMIT,
            search_count: 10,
            temperature: 0.5,
            direction_interval: 5,
            suggestions: SuggestionMode::Off,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_token_budget(mut self, token_limit: usize, char_cut: usize) -> Self {
        self.token_limit = token_limit;
        self.char_cut = char_cut;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_direction_interval(mut self, interval: u32) -> Self {
        self.direction_interval = interval;
        self
    }

    pub fn with_suggestions(mut self, mode: SuggestionMode) -> Self {
        self.suggestions = mode;
        self
    }
}

/// Result type for Odysseus operations
pub type Result<T> = std::result::Result<T, OdysseusError>;

/// Errors that can occur in Odysseus
#[derive(Debug, thiserror::Error)]
pub enum OdysseusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Content extraction for fetched pages
//!
//! Turns raw HTML or PDF bytes into bounded plain text plus the page's
//! outbound links. Extraction never fails outright: undecodable content yields
//! empty text with an error tag so the exploration loop can move on.

mod budget;
mod html;
mod pdf;

pub use budget::{TokenBudget, TRUNCATION_MARKER};
pub(crate) use html::compact_ws;

use tracing::{debug, warn};

/// Default token count above which text is truncated
pub const DEFAULT_TOKEN_LIMIT: usize = 10_000;

/// Default character cut applied once the token limit is exceeded
pub const DEFAULT_CHAR_CUT: usize = 50_000;

/// Default cap on links returned per page
pub const DEFAULT_LINK_LIMIT: usize = 100;

/// Share of U+FFFD in lossily decoded text above which we give up on it
const MAX_REPLACEMENT_RATIO: f64 = 0.01;

/// What kind of document a fetched body is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Html,
    Pdf,
}

impl PageKind {
    /// Decide from magic bytes, then an explicit content type, then URL shape.
    pub fn detect(content_type: Option<&str>, url: &str, body: &[u8]) -> Self {
        if body.starts_with(b"%PDF-") {
            return Self::Pdf;
        }

        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
        if let Some(mime) = mime {
            return if mime == "application/pdf" || mime == "application/x-pdf" {
                Self::Pdf
            } else {
                Self::Html
            };
        }

        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        if path.ends_with(".pdf") || path.contains("/pdf/") {
            Self::Pdf
        } else {
            Self::Html
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Html => write!(f, "html"),
            Self::Pdf => write!(f, "pdf"),
        }
    }
}

/// An outbound link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub label: String,
    pub url: String,
}

/// Why a page produced no text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("content could not be decoded as text")]
    Undecodable,

    #[error("PDF parse failed: {0}")]
    Pdf(String),
}

/// Result of extracting a page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<PageLink>,
    pub truncated: bool,
    pub error: Option<ExtractError>,
}

impl ExtractedPage {
    fn failed(error: ExtractError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Numbered link list for prompts, capped at `max`.
    pub fn links_for_prompt(&self, max: usize) -> String {
        if self.links.is_empty() {
            return "None".to_string();
        }
        self.links
            .iter()
            .take(max)
            .enumerate()
            .map(|(i, link)| format!("{}. {}, {}", i + 1, link.label, link.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Extracts text and links under a token budget
#[derive(Debug, Clone)]
pub struct Extractor {
    budget: TokenBudget,
    link_limit: usize,
}

impl Extractor {
    pub fn new(budget: TokenBudget, link_limit: usize) -> Self {
        Self { budget, link_limit }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Extract a fetched body. `base_url` resolves relative links.
    pub fn extract(&self, raw: &[u8], kind: PageKind, base_url: &str) -> ExtractedPage {
        let page = match kind {
            PageKind::Html => self.extract_html(raw, base_url),
            PageKind::Pdf => match pdf::text(raw) {
                Ok(text) => ExtractedPage {
                    text,
                    ..Default::default()
                },
                Err(e) => ExtractedPage::failed(e),
            },
        };

        if let Some(err) = &page.error {
            warn!("Extraction failed for {} ({}): {}", base_url, kind, err);
            return page;
        }

        let (text, truncated) = self.budget.apply(page.text);
        debug!(
            "Extracted {} chars, {} links from {} (truncated: {})",
            text.len(),
            page.links.len(),
            base_url,
            truncated
        );
        ExtractedPage {
            text,
            truncated,
            ..page
        }
    }

    fn extract_html(&self, raw: &[u8], base_url: &str) -> ExtractedPage {
        let Some(source) = decode(raw) else {
            return ExtractedPage::failed(ExtractError::Undecodable);
        };
        let content = html::parse(&source, base_url, self.link_limit);
        ExtractedPage {
            title: content.title,
            text: content.text,
            links: content.links,
            truncated: false,
            error: None,
        }
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Some(text.to_string());
    }
    let lossy = String::from_utf8_lossy(raw);
    let total = lossy.chars().count().max(1);
    let replaced = lossy.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
    if replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
        return None;
    }
    Some(lossy.into_owned())
}

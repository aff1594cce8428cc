//! Per-run exploration state.
//!
//! Owned by the explorer for the whole run; nothing else mutates it.

use crate::reading::PageLink;
use crate::urls;
use std::collections::HashSet;
use std::path::PathBuf;

/// What the next pass works on
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    Url(String),
    Concept(String),
    #[default]
    Empty,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Concept(concept) => write!(f, "\"{}\"", concept),
            Self::Empty => write!(f, "(nothing)"),
        }
    }
}

/// Loop phase, derived from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Searching,
    Reading,
    Done,
}

#[derive(Debug, Clone)]
pub struct ExplorationState {
    pub(crate) seed: String,
    pub(crate) current_target: Target,
    visited_raw: Vec<String>,
    visited_normalized: HashSet<String>,
    explored_topics: Vec<String>,
    iteration: u32,
    max_pages: u32,
    memory_dir: PathBuf,
    memories: Vec<String>,
    consecutive_give_ups: u32,
    page_links: Vec<PageLink>,
}

impl ExplorationState {
    pub fn new(seed: impl Into<String>, start: Target, max_pages: u32, memory_dir: PathBuf) -> Self {
        Self {
            seed: seed.into(),
            current_target: start,
            visited_raw: Vec::new(),
            visited_normalized: HashSet::new(),
            explored_topics: Vec::new(),
            iteration: 0,
            max_pages,
            memory_dir,
            memories: Vec::new(),
            consecutive_give_ups: 0,
            page_links: Vec::new(),
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn target(&self) -> &Target {
        &self.current_target
    }

    pub fn set_target(&mut self, target: Target) {
        self.current_target = target;
    }

    pub fn phase(&self) -> Phase {
        match self.current_target {
            Target::Url(_) => Phase::Reading,
            Target::Concept(_) => Phase::Searching,
            Target::Empty => Phase::Done,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn limit_reached(&self) -> bool {
        self.iteration >= self.max_pages
    }

    /// Start a pass. Exactly one increment per pass.
    pub(crate) fn advance(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited_normalized.contains(&urls::normalize(url))
    }

    /// Record a URL just before fetching it. Returns false if it was already visited.
    pub(crate) fn mark_visited(&mut self, url: &str) -> bool {
        if !self.visited_normalized.insert(urls::normalize(url)) {
            return false;
        }
        self.visited_raw.push(url.to_string());
        true
    }

    pub fn visited(&self) -> &[String] {
        &self.visited_raw
    }

    pub fn topics(&self) -> &[String] {
        &self.explored_topics
    }

    /// Append topics not seen before (case-insensitive). Returns how many were new.
    pub(crate) fn add_topics(&mut self, topics: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        for topic in topics {
            let topic = topic.trim().to_string();
            if topic.is_empty() {
                continue;
            }
            let known = self
                .explored_topics
                .iter()
                .any(|t| t.to_lowercase() == topic.to_lowercase());
            if !known {
                self.explored_topics.push(topic);
                added += 1;
            }
        }
        added
    }

    pub fn memory_dir(&self) -> &PathBuf {
        &self.memory_dir
    }

    pub fn memories(&self) -> &[String] {
        &self.memories
    }

    pub(crate) fn record_memory(&mut self, id: String) {
        self.memories.push(id);
    }

    /// Track give-up resolutions. Returns the current streak.
    pub(crate) fn note_resolution(&mut self, gave_up: bool) -> u32 {
        if gave_up {
            self.consecutive_give_ups += 1;
        } else {
            self.consecutive_give_ups = 0;
        }
        self.consecutive_give_ups
    }

    pub fn page_links(&self) -> &[PageLink] {
        &self.page_links
    }

    pub(crate) fn set_page_links(&mut self, links: Vec<PageLink>) {
        self.page_links = links;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ExplorationState {
        ExplorationState::new(
            "deontic logic",
            Target::Concept("deontic logic".to_string()),
            3,
            PathBuf::from("/tmp/run"),
        )
    }

    #[test]
    fn test_target_replaces() {
        let mut s = state();
        assert_eq!(s.phase(), Phase::Searching);
        s.set_target(Target::Url("https://a.com".to_string()));
        assert_eq!(s.phase(), Phase::Reading);
        assert_eq!(s.target(), &Target::Url("https://a.com".to_string()));
        s.set_target(Target::Empty);
        assert_eq!(s.phase(), Phase::Done);
    }

    #[test]
    fn test_visited_by_normalized_form() {
        let mut s = state();
        assert!(s.mark_visited("https://a.com/x#intro"));
        assert!(s.is_visited("https://a.com/x"));
        assert!(s.is_visited("https://a.com/x#other"));
        assert!(!s.mark_visited("https://a.com/x)"));
        assert_eq!(s.visited(), &["https://a.com/x#intro".to_string()]);
    }

    #[test]
    fn test_iteration_limit() {
        let mut s = state();
        assert!(!s.limit_reached());
        for expected in 1..=3 {
            assert_eq!(s.advance(), expected);
        }
        assert!(s.limit_reached());
    }

    #[test]
    fn test_topics_deduplicated() {
        let mut s = state();
        assert_eq!(s.add_topics(vec!["Ethics".to_string(), " ".to_string()]), 1);
        assert_eq!(s.add_topics(vec!["ethics".to_string(), "Modal logic".to_string()]), 1);
        assert_eq!(s.topics(), &["Ethics".to_string(), "Modal logic".to_string()]);
    }

    #[test]
    fn test_give_up_streak() {
        let mut s = state();
        assert_eq!(s.note_resolution(true), 1);
        assert_eq!(s.note_resolution(true), 2);
        assert_eq!(s.note_resolution(false), 0);
    }
}

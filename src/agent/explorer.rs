//! The exploration loop
//!
//! One sequential loop per run. Each pass either searches for the current
//! concept (and usually reads the chosen result in the same pass) or reads
//! the current URL: fetch, extract, reflect, store, decide. Every network
//! await is raced against the cancellation token; the memory write is not.

use super::state::{ExplorationState, Target};
use crate::console::{self, Tone};
use crate::decision::{parse_topics, Decision, DecisionContext, DecisionProtocol, Resolution};
use crate::fetch::Fetcher;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::memory::{MemoryStore, SessionSummary};
use crate::reading::{Extractor, PageKind, PageLink, TokenBudget};
use crate::search::SearchProvider;
use crate::{prompts, urls, OdysseusConfig, Result};
use chrono::Local;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Give-up resolutions in a row that end the run
const MAX_CONSECUTIVE_GIVE_UPS: u32 = 2;

/// Recent memories shown when suggesting a new direction
const DIRECTION_MEMORY_PREVIEWS: usize = 3;

/// What to do with a suggested new direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SuggestionMode {
    /// Show the suggestion, keep going
    #[default]
    Off,
    /// Switch to the suggestion
    Accept,
    /// Ask on stdin
    Ask,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Page limit reached
    Completed,
    /// The model asked to stop, or decisions kept failing
    Stopped,
    /// Nothing left to explore
    Exhausted,
    /// Cancelled by the user
    Cancelled,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "page limit reached"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exhausted => write!(f, "nothing left to explore"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub run_dir: PathBuf,
    pub summary_path: Option<PathBuf>,
    pub passes: u32,
    pub visited: Vec<String>,
    pub memories: Vec<String>,
    pub topics: Vec<String>,
}

/// `None` from a step means the run was cancelled mid-step
type Step = Option<Option<Outcome>>;

pub struct Explorer {
    config: OdysseusConfig,
    model: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn Fetcher>,
    store: MemoryStore,
    extractor: Extractor,
    protocol: DecisionProtocol,
    cancel: CancellationToken,
}

impl Explorer {
    /// Set up a run. Fails if the run directory cannot be created.
    pub async fn new(
        config: OdysseusConfig,
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let store = MemoryStore::open(&config.log_dir).await?;
        let extractor = Extractor::new(
            TokenBudget::new(config.token_limit, config.char_cut),
            config.link_limit,
        );
        let protocol = DecisionProtocol::new(config.temperature);

        Ok(Self {
            config,
            model,
            search,
            fetcher,
            store,
            extractor,
            protocol,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn run_dir(&self) -> &std::path::Path {
        self.store.dir()
    }

    /// Explore from a concept.
    pub async fn explore_concept(&self, concept: &str) -> Result<SessionReport> {
        self.run(concept, Target::Concept(concept.to_string())).await
    }

    /// Explore from a URL. The URL doubles as the seed.
    pub async fn explore_url(&self, url: &str) -> Result<SessionReport> {
        let url = urls::clean(url);
        self.run(&url, Target::Url(url.clone())).await
    }

    async fn run(&self, seed: &str, start: Target) -> Result<SessionReport> {
        let started_at = Local::now();
        let mut state = ExplorationState::new(
            seed,
            start,
            self.config.max_pages,
            self.store.dir().to_path_buf(),
        );
        info!(
            "Exploration started: seed={:?}, max_pages={}, dir={}",
            seed,
            self.config.max_pages,
            self.store.dir().display()
        );

        let outcome = self.explore(&mut state).await;
        self.fetcher.shutdown().await;
        info!("Exploration ended after {} passes: {}", state.iteration(), outcome);

        let summary = SessionSummary {
            seed: seed.to_string(),
            started_at,
            finished_at: Local::now(),
            model: self.model.model_name().to_string(),
            visited: state.visited().to_vec(),
            memory_count: state.memories().len(),
            topics: state.topics().to_vec(),
        };
        let summary_path = match summary.write(self.store.dir()).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write session summary: {}", e);
                None
            }
        };

        Ok(SessionReport {
            outcome,
            run_dir: self.store.dir().to_path_buf(),
            summary_path,
            passes: state.iteration(),
            visited: state.visited().to_vec(),
            memories: state.memories().to_vec(),
            topics: state.topics().to_vec(),
        })
    }

    async fn explore(&self, state: &mut ExplorationState) -> Outcome {
        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            if state.limit_reached() {
                return Outcome::Completed;
            }
            if state.target() == &Target::Empty {
                return Outcome::Exhausted;
            }

            let pass = state.advance();
            console::status(
                Tone::Info,
                &format!("[{}/{}] {}", pass, state.max_pages(), state.target()),
            );

            let interval = self.config.direction_interval;
            let direction_due = interval > 0 && pass % interval == 0;
            if direction_due
                && !state.topics().is_empty()
                && self.suggest_new_direction(state).await.is_none()
            {
                return Outcome::Cancelled;
            }

            if let Target::Concept(query) = state.target().clone() {
                match self.search_step(state, &query).await {
                    None => return Outcome::Cancelled,
                    Some(Some(outcome)) => return outcome,
                    Some(None) => {}
                }
            }

            if let Target::Url(url) = state.target().clone() {
                match self.read_step(state, &url).await {
                    None => return Outcome::Cancelled,
                    Some(Some(outcome)) => return outcome,
                    Some(None) => {}
                }
            }
        }
    }

    /// Race a future against cancellation.
    async fn guarded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    fn request(&self, user: String) -> CompletionRequest {
        CompletionRequest::new(user, self.config.temperature).with_system(prompts::NAVIGATOR_MANIFEST)
    }

    /// Ask the model; failures become an empty reply so decision fallbacks apply.
    async fn ask(&self, user: String) -> Option<String> {
        let request = self.request(user);
        match self.guarded(self.model.complete(&request)).await? {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Model call failed: {}", e);
                Some(String::new())
            }
        }
    }

    async fn decide(&self, state: &ExplorationState, reply: &str, candidates: &[PageLink]) -> Option<Resolution> {
        let ctx = DecisionContext {
            seed: state.seed(),
            candidates,
            topics: state.topics(),
        };
        self.guarded(self.protocol.resolve(self.model.as_ref(), reply, &ctx))
            .await
    }

    /// Move the state according to a resolution.
    fn apply(&self, state: &mut ExplorationState, resolution: Resolution) -> Option<Outcome> {
        let streak = state.note_resolution(resolution.is_give_up());
        if streak >= MAX_CONSECUTIVE_GIVE_UPS {
            console::status(Tone::Error, "Still unclear what to do next. Ending the exploration.");
            return Some(Outcome::Stopped);
        }

        match resolution.decision {
            Decision::Stop => {
                console::status(Tone::Accent, "Decided to stop exploring.");
                Some(Outcome::Stopped)
            }
            Decision::FollowLink(url) => {
                let url = urls::clean(&url);
                console::status(Tone::Success, &format!("Next: following {}", url));
                state.set_target(Target::Url(url));
                None
            }
            Decision::Search(query) => {
                console::status(Tone::Success, &format!("Next: searching for \"{}\"", query));
                state.set_target(Target::Concept(query));
                None
            }
        }
    }

    async fn search_step(&self, state: &mut ExplorationState, query: &str) -> Step {
        console::status(Tone::Info, &format!("Searching for \"{}\"", query));
        let results = self
            .guarded(self.search.search(query, self.config.search_count))
            .await?;

        let resolution = match results.len() {
            0 => {
                console::status(Tone::Warn, "No search results.");
                let ctx = DecisionContext {
                    seed: state.seed(),
                    candidates: &[],
                    topics: state.topics(),
                };
                DecisionProtocol::give_up(&ctx)
            }
            1 => {
                debug!("Single search result, following it");
                state.note_resolution(false);
                state.set_target(Target::Url(urls::clean(&results[0].url)));
                return Some(None);
            }
            _ => {
                let prompt = prompts::search_consideration(query, &results, |url| state.is_visited(url));
                let reply = self.ask(prompt).await?;
                let candidates: Vec<PageLink> = results
                    .iter()
                    .map(|r| PageLink {
                        label: r.title.clone(),
                        url: r.url.clone(),
                    })
                    .collect();
                self.decide(state, &reply, &candidates).await?
            }
        };

        Some(self.apply(state, resolution))
    }

    async fn read_step(&self, state: &mut ExplorationState, url: &str) -> Step {
        if state.is_visited(url) {
            console::status(Tone::Warn, &format!("Already visited {}", url));
            let reply = self.ask(prompts::already_visited(url)).await?;
            let candidates = state.page_links().to_vec();
            let resolution = self.decide(state, &reply, &candidates).await?;
            return Some(self.apply(state, resolution));
        }

        state.mark_visited(url);
        console::status(Tone::Info, &format!("Reading {}", url));

        let fetched = match self.guarded(self.fetcher.fetch(url)).await? {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                return self.recover_unreadable(state, url, &e.to_string()).await;
            }
        };

        let kind = PageKind::detect(fetched.content_type.as_deref(), &fetched.final_url, &fetched.body);
        let page = self.extractor.extract(&fetched.body, kind, &fetched.final_url);
        if let Some(err) = &page.error {
            return self.recover_unreadable(state, url, &err.to_string()).await;
        }
        if page.text.trim().is_empty() {
            return self.recover_unreadable(state, url, "no readable text").await;
        }
        if page.truncated {
            debug!("Content of {} truncated to fit the token budget", url);
        }

        let reflection = self
            .ask(prompts::reflection(url, page.title.as_deref(), &page.text))
            .await?;
        if reflection.trim().is_empty() {
            warn!("Empty reflection for {}, no memory written", url);
        } else {
            console::reflection_panel(page.title.as_deref().unwrap_or(url), &reflection);
            match self.store.write(&reflection, url).await {
                Ok(record) => {
                    info!("Memory saved: {}", record.id);
                    state.record_memory(record.id);
                }
                Err(e) => warn!("Failed to save memory for {}: {}", url, e),
            }

            let topics_reply = self.ask(prompts::topics(&reflection)).await?;
            let added = state.add_topics(parse_topics(&topics_reply));
            if added > 0 {
                debug!("Topics now: {:?}", state.topics());
            }
        }

        let links = page.links_for_prompt(prompts::MAX_PROMPT_LINKS);
        state.set_page_links(page.links);
        let reply = self.ask(prompts::next_action(url, &links)).await?;
        let candidates = state.page_links().to_vec();
        let resolution = self.decide(state, &reply, &candidates).await?;
        Some(self.apply(state, resolution))
    }

    /// The page could not be used; let the model pick something else.
    async fn recover_unreadable(&self, state: &mut ExplorationState, url: &str, reason: &str) -> Step {
        console::status(Tone::Error, &format!("Could not load {}: {}", url, reason));
        state.set_page_links(Vec::new());
        let reply = self.ask(prompts::fetch_failed(url, reason)).await?;
        let resolution = self.decide(state, &reply, &[]).await?;
        Some(self.apply(state, resolution))
    }

    /// Offer a new direction. `None` if cancelled.
    async fn suggest_new_direction(&self, state: &mut ExplorationState) -> Option<()> {
        console::status(
            Tone::Accent,
            &format!(
                "You've explored {} pages. Consider exploring new directions.",
                state.visited().len()
            ),
        );

        let recent = self
            .store
            .read_recent(DIRECTION_MEMORY_PREVIEWS)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not read recent memories: {}", e);
                Vec::new()
            });
        let reply = self.ask(prompts::new_direction(state.topics(), &recent)).await?;
        let suggestion = reply.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string();
        if suggestion.is_empty() {
            return Some(());
        }
        console::status(Tone::Warn, &format!("Suggested new direction: {}", suggestion));

        let accepted = match self.config.suggestions {
            SuggestionMode::Off => false,
            SuggestionMode::Accept => true,
            SuggestionMode::Ask => self.confirm("Would you like to explore this topic? (y/n): ").await?,
        };
        if accepted {
            console::status(Tone::Success, &format!("Exploring new direction: {}", suggestion));
            state.set_target(Target::Concept(suggestion));
        }
        Some(())
    }

    /// Read a y/n answer from stdin. `None` if cancelled while waiting.
    async fn confirm(&self, question: &str) -> Option<bool> {
        print!("{}", question);
        let _ = io::stdout().flush();

        // A plain thread, so a pending read never holds up runtime shutdown
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let answer = io::stdin().lock().read_line(&mut line).map(|_| line);
            let _ = tx.send(answer);
        });

        match self.guarded(rx).await? {
            Ok(Ok(line)) => Some(matches!(line.trim().to_lowercase().as_str(), "y" | "yes")),
            Ok(Err(e)) => {
                warn!("Could not read answer: {}", e);
                Some(false)
            }
            Err(_) => Some(false),
        }
    }
}

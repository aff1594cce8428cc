//! Decision protocol
//!
//! Turns free-form model output into a typed [`Decision`]. Local parsing tiers
//! run first; one explicit JSON-mode retry follows; the last resort is
//! searching the seed concept again. [`DecisionProtocol::resolve`] never
//! fails and never waits on more than one extra model call.

mod parser;

use crate::llm::{CompletionRequest, LanguageModel};
use crate::prompts;
use crate::reading::PageLink;
use tracing::{debug, info, warn};

/// What the loop does next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    FollowLink(String),
    Search(String),
    Stop,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FollowLink(url) => write!(f, "follow {}", url),
            Self::Search(query) => write!(f, "search {:?}", query),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Which recovery step produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Structured,
    EmbeddedJson,
    UrlRecovery,
    KeywordRecovery,
    Retry,
    GiveUp,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::EmbeddedJson => write!(f, "embedded-json"),
            Self::UrlRecovery => write!(f, "url-recovery"),
            Self::KeywordRecovery => write!(f, "keyword-recovery"),
            Self::Retry => write!(f, "retry"),
            Self::GiveUp => write!(f, "give-up"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub tier: Tier,
}

impl Resolution {
    pub fn new(decision: Decision, tier: Tier) -> Self {
        Self { decision, tier }
    }

    pub fn is_give_up(&self) -> bool {
        self.tier == Tier::GiveUp
    }
}

/// What a reply is resolved against
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Fallback search when nothing else works
    pub seed: &'a str,
    /// Links a 1-based `link_num` indexes into
    pub candidates: &'a [PageLink],
    pub topics: &'a [String],
}

#[derive(Debug, Clone)]
pub struct DecisionProtocol {
    temperature: f32,
}

impl DecisionProtocol {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    /// Resolve without calling the model. `None` when the local tiers fail.
    pub fn parse_local(&self, raw: &str, ctx: &DecisionContext<'_>) -> Option<Resolution> {
        parser::parse_local(raw, ctx)
    }

    pub fn give_up(ctx: &DecisionContext<'_>) -> Resolution {
        Resolution::new(Decision::Search(ctx.seed.to_string()), Tier::GiveUp)
    }

    pub async fn resolve(
        &self,
        model: &dyn LanguageModel,
        raw: &str,
        ctx: &DecisionContext<'_>,
    ) -> Resolution {
        if let Some(resolution) = parser::parse_local(raw, ctx) {
            debug!("Decision via {}: {}", resolution.tier, resolution.decision);
            return resolution;
        }

        info!("Couldn't parse decision, retrying with an explicit prompt");
        let request = CompletionRequest::new(prompts::retry(raw), self.temperature)
            .with_system(prompts::NAVIGATOR_MANIFEST)
            .json();

        match model.complete(&request).await {
            Ok(reply) => {
                if let Some(decision) = parser::structured(&reply, ctx) {
                    debug!("Decision via retry: {}", decision);
                    return Resolution::new(decision, Tier::Retry);
                }
                debug!("Retry reply unusable: {}", reply);
            }
            Err(e) => warn!("Decision retry failed: {}", e),
        }

        let resolution = Self::give_up(ctx);
        info!("Falling back to {}", resolution.decision);
        resolution
    }
}

/// Topics from a reply expected to hold a JSON array of strings.
pub fn parse_topics(raw: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(&raw[start..=end]) else {
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

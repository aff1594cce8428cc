//! Local recovery tiers for model decisions.
//!
//! Parsing strategy, first match wins:
//! 1. Deserialize the whole reply as a decision object.
//! 2. Slice from the first `{` to the last `}` and retry, then the first
//!    balanced object.
//! 3. Take the first http(s) URL in the text.
//! 4. Look for search phrasing ("search for", "look up", ...) or a mention
//!    of an explored topic next to "related"/"similar".
//!
//! Nothing here returns an error; `None` means "try the next tier".

use super::{Decision, DecisionContext, Resolution, Tier};
use crate::urls;
use serde::Deserialize;
use serde_json::Value;

/// Phrases that introduce a search query in free text
const SEARCH_INDICATORS: &[&str] = &[
    "search for",
    "search about",
    "look up",
    "find information about",
    "research",
];

/// Characters that end a recovered query
const QUERY_TERMINATORS: &[char] = &['.', '!', '?', '\n'];

/// Longest query recovered from free text
const MAX_QUERY_CHARS: usize = 50;

/// How far before a topic mention to look for "related"/"similar"
const RELATED_WINDOW: usize = 30;

/// Values models use to mean "nothing here"
const EMPTY_MARKERS: &[&str] = &["", "none", "null", "n/a", "-"];

/// Every key the loop's prompts ask for, plus the older shape.
///
/// ```json
/// { "search_for": "normative ethics", "link_to_follow": "" }
/// { "url": "https://en.wikipedia.org/wiki/Deontic_logic" }
/// { "what_to_search": "", "link_num": 3 }
/// ```
#[derive(Debug, Default, Deserialize)]
struct DecisionJson {
    #[serde(default)]
    url: Option<Value>,
    #[serde(default)]
    link: Option<Value>,
    #[serde(default)]
    search_for: Option<Value>,
    #[serde(default)]
    link_to_follow: Option<Value>,
    #[serde(default)]
    what_to_search: Option<Value>,
    #[serde(default)]
    link_num: Option<Value>,
    #[serde(default)]
    stop: Option<Value>,
}

/// Non-empty string content of a JSON value.
fn text_value(value: &Option<Value>) -> Option<String> {
    let s = match value.as_ref()? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = s.to_ascii_lowercase();
    (!EMPTY_MARKERS.contains(&lowered.as_str())).then_some(s)
}

fn url_value(value: &Option<Value>) -> Option<String> {
    let cleaned = urls::clean(&text_value(value)?);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn is_true(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

impl DecisionJson {
    fn into_decision(self, ctx: &DecisionContext<'_>) -> Option<Decision> {
        if is_true(&self.stop) {
            return Some(Decision::Stop);
        }
        if let Some(url) = url_value(&self.url).or_else(|| url_value(&self.link)) {
            return Some(Decision::FollowLink(url));
        }
        if let Some(query) = text_value(&self.search_for) {
            return Some(Decision::Search(query));
        }
        if let Some(url) = url_value(&self.link_to_follow) {
            return Some(Decision::FollowLink(url));
        }
        if let Some(query) = text_value(&self.what_to_search) {
            return Some(Decision::Search(query));
        }
        let index: usize = text_value(&self.link_num)?.parse().ok()?;
        let link = ctx.candidates.get(index.checked_sub(1)?)?;
        Some(Decision::FollowLink(link.url.clone()))
    }
}

/// Tier 1: the whole text is a usable decision object.
pub(crate) fn structured(text: &str, ctx: &DecisionContext<'_>) -> Option<Decision> {
    let parsed: DecisionJson = serde_json::from_str(text.trim()).ok()?;
    parsed.into_decision(ctx)
}

/// Tier 2: a decision object embedded in prose or a code fence.
pub(crate) fn embedded(text: &str, ctx: &DecisionContext<'_>) -> Option<Decision> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        if let Some(decision) = structured(&text[start..=end], ctx) {
            return Some(decision);
        }
    }
    // Several objects in one reply: the widest slice is not valid JSON
    structured(first_json_object(text)?, ctx)
}

/// Tier 3: the first URL mentioned anywhere.
pub(crate) fn url_recovery(text: &str) -> Option<Decision> {
    urls::first_url(text).map(Decision::FollowLink)
}

/// Tier 4: search phrasing, then "related"/"similar" explored topics.
/// First occurrence of `phrase` as whole words, so "research" skips "researchers".
fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    haystack.match_indices(phrase).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + phrase.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

pub(crate) fn keyword_recovery(text: &str, topics: &[String]) -> Option<Decision> {
    // ASCII lowering keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();

    for indicator in SEARCH_INDICATORS {
        let Some(pos) = find_phrase(&lower, indicator) else {
            continue;
        };
        let after = &text[pos + indicator.len()..];
        let end = after.find(QUERY_TERMINATORS).unwrap_or(after.len());
        let query: String = after[..end].trim_start().chars().take(MAX_QUERY_CHARS).collect();
        let query = query
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ':' | '*'))
            .trim();
        if query.chars().count() > 3 {
            return Some(Decision::Search(query.to_string()));
        }
    }

    for topic in topics {
        let needle = topic.trim().to_ascii_lowercase();
        if needle.is_empty() {
            continue;
        }
        let Some(pos) = lower.find(&needle) else {
            continue;
        };
        let mut window_start = pos.saturating_sub(RELATED_WINDOW);
        while !lower.is_char_boundary(window_start) {
            window_start -= 1;
        }
        let before = &lower[window_start..pos];
        if before.contains("related") || before.contains("similar") {
            return Some(Decision::Search(topic.trim().to_string()));
        }
    }

    None
}

/// Tiers 1 to 4 in order.
pub(crate) fn parse_local(text: &str, ctx: &DecisionContext<'_>) -> Option<Resolution> {
    if let Some(decision) = structured(text, ctx) {
        return Some(Resolution::new(decision, Tier::Structured));
    }
    if let Some(decision) = embedded(text, ctx) {
        return Some(Resolution::new(decision, Tier::EmbeddedJson));
    }
    if let Some(decision) = url_recovery(text) {
        return Some(Resolution::new(decision, Tier::UrlRecovery));
    }
    keyword_recovery(text, ctx.topics).map(|decision| Resolution::new(decision, Tier::KeywordRecovery))
}

/// Extract the first balanced `{…}` object, ignoring braces inside strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return text.get(start..start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::PageLink;

    fn ctx<'a>(candidates: &'a [PageLink], topics: &'a [String]) -> DecisionContext<'a> {
        DecisionContext {
            seed: "deontic logic",
            candidates,
            topics,
        }
    }

    fn parse(text: &str) -> Option<Resolution> {
        parse_local(text, &ctx(&[], &[]))
    }

    #[test]
    fn test_structured_url() {
        let r = parse(r#"{"url": "https://x.com"}"#).unwrap();
        assert_eq!(r.tier, Tier::Structured);
        assert_eq!(r.decision, Decision::FollowLink("https://x.com".to_string()));
    }

    #[test]
    fn test_structured_search_wins_over_link() {
        let r = parse(r#"{"search_for": "cats", "link_to_follow": "https://x.com/cats"}"#).unwrap();
        assert_eq!(r.decision, Decision::Search("cats".to_string()));

        let r = parse(r#"{"search_for": "", "link_to_follow": "https://x.com/cats."}"#).unwrap();
        assert_eq!(r.decision, Decision::FollowLink("https://x.com/cats".to_string()));
    }

    #[test]
    fn test_structured_single_key_is_enough() {
        let r = parse(r#"{"link_to_follow": "https://x.com/a"}"#).unwrap();
        assert_eq!(r.decision, Decision::FollowLink("https://x.com/a".to_string()));
        let r = parse(r#"{"search_for": "dogs"}"#).unwrap();
        assert_eq!(r.decision, Decision::Search("dogs".to_string()));
    }

    #[test]
    fn test_structured_legacy_shape() {
        let links = vec![
            PageLink {
                label: "One".to_string(),
                url: "https://a.com/1".to_string(),
            },
            PageLink {
                label: "Two".to_string(),
                url: "https://a.com/2".to_string(),
            },
        ];
        let c = ctx(&links, &[]);
        assert_eq!(
            structured(r#"{"what_to_search": "", "link_num": 2}"#, &c),
            Some(Decision::FollowLink("https://a.com/2".to_string()))
        );
        assert_eq!(
            structured(r#"{"what_to_search": "", "link_num": "1"}"#, &c),
            Some(Decision::FollowLink("https://a.com/1".to_string()))
        );
        assert_eq!(structured(r#"{"link_num": 9}"#, &c), None);
        assert_eq!(structured(r#"{"link_num": 0}"#, &c), None);
        assert_eq!(
            structured(r#"{"what_to_search": "modal logic", "link_num": ""}"#, &c),
            Some(Decision::Search("modal logic".to_string()))
        );
    }

    #[test]
    fn test_structured_stop() {
        assert_eq!(parse(r#"{"stop": true}"#).unwrap().decision, Decision::Stop);
        assert!(parse(r#"{"stop": false}"#).is_none());
    }

    #[test]
    fn test_all_empty_object_does_not_match() {
        assert!(parse(r#"{"search_for": "", "link_to_follow": ""}"#).is_none());
        assert!(parse(r#"{"search_for": "none", "link_to_follow": null}"#).is_none());
        assert!(parse("{}").is_none());
    }

    #[test]
    fn test_embedded_json() {
        let r = parse(r#"Here is some text {"search_for": "cats", "link_to_follow": ""} end"#).unwrap();
        assert_eq!(r.tier, Tier::EmbeddedJson);
        assert_eq!(r.decision, Decision::Search("cats".to_string()));

        let fenced = "```json\n{\"url\": \"https://x.com/a\"}\n```";
        let r = parse(fenced).unwrap();
        assert_eq!(r.tier, Tier::EmbeddedJson);
    }

    #[test]
    fn test_embedded_first_of_several_objects() {
        let text = r#"Option A: {"search_for": "cats"} or option B: {"search_for": "dogs"}"#;
        let r = parse(text).unwrap();
        assert_eq!(r.tier, Tier::EmbeddedJson);
        assert_eq!(r.decision, Decision::Search("cats".to_string()));
    }

    #[test]
    fn test_url_recovery() {
        let r = parse("You should check out https://example.org/page.").unwrap();
        assert_eq!(r.tier, Tier::UrlRecovery);
        assert_eq!(r.decision, Decision::FollowLink("https://example.org/page".to_string()));
    }

    #[test]
    fn test_keyword_recovery() {
        let r = parse("I recommend you search for quantum biology next.").unwrap();
        assert_eq!(r.tier, Tier::KeywordRecovery);
        let Decision::Search(query) = r.decision else {
            panic!("expected a search");
        };
        assert!(query.starts_with("quantum biology"));
    }

    #[test]
    fn test_keyword_query_bounded() {
        let long = format!("Let's look up {}", "x".repeat(200));
        let Some(Decision::Search(query)) = keyword_recovery(&long, &[]) else {
            panic!("expected a search");
        };
        assert_eq!(query.chars().count(), MAX_QUERY_CHARS);
    }

    #[test]
    fn test_keyword_too_short_rejected() {
        assert_eq!(keyword_recovery("Maybe search for it.", &[]), None);
    }

    #[test]
    fn test_keyword_needs_whole_words() {
        assert_eq!(
            keyword_recovery("The researchers at MIT published a new result.", &[]),
            None
        );
        assert_eq!(
            keyword_recovery("Researchers agree; I will research category theory next.", &[]),
            Some(Decision::Search("category theory next".to_string()))
        );
    }

    #[test]
    fn test_keyword_non_ascii_text() {
        let r = keyword_recovery("Świetnie! Search for żółta łódź podwodna.", &[]);
        assert_eq!(r, Some(Decision::Search("żółta łódź podwodna".to_string())));
    }

    #[test]
    fn test_related_topic_recovery() {
        let topics = vec!["modal logic".to_string()];
        let r = keyword_recovery("I'd continue with something related to Modal Logic now", &topics);
        assert_eq!(r, Some(Decision::Search("modal logic".to_string())));
        assert_eq!(keyword_recovery("Modal logic was fun", &topics), None);
    }

    #[test]
    fn test_gibberish_unresolved() {
        assert!(parse("asdf qwer zxcv").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_first_json_object_nested() {
        let text = r#"prefix {"a": {"b": "}"}, "c": 2} suffix {"d": 1}"#;
        assert_eq!(first_json_object(text), Some(r#"{"a": {"b": "}"}, "c": 2}"#));
    }
}

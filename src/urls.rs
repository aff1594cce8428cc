//! URL cleaning and normalization
//!
//! `clean` turns a link captured from model output or page text into something
//! fetchable. `normalize` produces the canonical form used as the visited-set
//! key: two URLs that differ only by fragment or by trailing `)` artifacts
//! normalize identically.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Characters a text-extraction regex tends to swallow at the end of a link
const TRAILING_JUNK: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

/// Upper bound on parse/trim rounds in `normalize`
const MAX_NORMALIZE_PASSES: usize = 8;

fn url_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s()<>"'\[\]]+"#).expect("static regex compiles"))
}

/// Strip trailing punctuation and add a scheme if missing. Never fails.
pub fn clean(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return raw.to_string();
    }

    let stripped = trimmed.trim_end_matches(TRAILING_JUNK);
    if stripped.is_empty() {
        return String::new();
    }

    if stripped.starts_with("http") {
        stripped.to_string()
    } else {
        format!("https://{}", stripped)
    }
}

/// Canonical comparable form: scheme + host + path + query, no fragment.
///
/// Unparseable input is returned unchanged, so it never matches a visited
/// entry for a different spelling of the same page.
pub fn normalize(url: &str) -> String {
    let mut current = url.trim().to_string();
    // Dropping a `)` can expose a dot segment the parser then resolves, so
    // repeat until the form is stable.
    for _ in 0..MAX_NORMALIZE_PASSES {
        let Ok(mut parsed) = Url::parse(&current) else {
            return current;
        };
        parsed.set_fragment(None);
        let next = parsed.as_str().trim_end_matches(')').to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Find every http(s) URL in free text, cleaned, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_token_regex()
        .find_iter(text)
        .map(|m| clean(m.as_str()))
        .filter(|u| !u.is_empty())
        .collect()
}

/// First http(s) URL in free text, cleaned.
pub fn first_url(text: &str) -> Option<String> {
    url_token_regex()
        .find(text)
        .map(|m| clean(m.as_str()))
        .filter(|u| !u.is_empty())
}

/// Host of a URL, if it parses.
pub fn domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

//! Prompt templates for the exploration loop

use crate::memory::MemoryRecord;
use crate::search::SearchResult;

/// Links listed in the next-action prompt
pub const MAX_PROMPT_LINKS: usize = 50;

/// System prompt for every model call
pub const NAVIGATOR_MANIFEST: &str = "You are Odysseus, an autonomous browsing agent that explores the internet to learn and build knowledge. Your goal is to read and analyze web content, extract key information, and make decisions about what to explore next.

Always prioritize scientific sources, especially arXiv papers. If scientific sources aren't available, prefer Wikipedia and other educational resources. Your goal is to learn as much information as possible about the topics you explore.

When analyzing content, find a balance between creativity and factual accuracy. Extract key claims and insights, and use markdown or LaTeX to format your responses. For mathematical formulas, use LaTeX syntax: $formula$ for inline and $$formula$$ for display equations.";

/// Sent once when a decision could not be understood
pub const RETRY_PROMPT: &str = r#"I need you to decide what to do next. Please respond ONLY with one of these two options:
1. A JSON with a search query like this: {"search_for": "topic to search", "link_to_follow": ""}
2. A JSON with a URL to follow like this: {"search_for": "", "link_to_follow": "https://example.com/page"}

Your response must be a valid JSON object with these exact keys. Do not include any other text."#;

const NEXT_ACTION_FORMAT: &str = r#"Respond with a JSON object with two keys:
- "search_for": your search query if you decide to search (leave empty if following a link)
- "link_to_follow": the URL to follow if you decide to follow a link (leave empty if searching)

For example:
{"search_for": "machine learning applications in healthcare", "link_to_follow": ""}
OR
{"search_for": "", "link_to_follow": "https://example.com/some-interesting-page"}

If you have learned enough and want to end the exploration, respond with {"stop": true} instead."#;

pub fn reflection(url: &str, title: Option<&str>, content: &str) -> String {
    let title = title.map(|t| format!("Title: {}\n", t)).unwrap_or_default();
    format!(
        "You are exploring a webpage at URL: {url}\n{title}\nThis is the content of the page:\n\n{content}\n\n\
         Analyze what you've read and formulate a detailed reflection that captures the key points, insights, \
         and knowledge contained in the content. Find a balance between creativity and factual accuracy. \
         Include the most important claims and information. Use markdown and LaTeX syntax as appropriate."
    )
}

pub fn next_action(url: &str, links: &str) -> String {
    format!(
        "You have just read {url}. Based on what you've learned, decide what to do next:\n\n\
         1. Follow a specific link from the current page to explore related content\n\
         2. Search for new information on a specific topic\n\n\
         These are the links on the current page:\n\n{links}\n\n{NEXT_ACTION_FORMAT}"
    )
}

pub fn search_consideration(query: &str, results: &[SearchResult], visited: impl Fn(&str) -> bool) -> String {
    let listing = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mark = if visited(&r.url) { " (already visited)" } else { "" };
            format!("{}. {}{}\n   {}\n   {}", i + 1, r.title, mark, r.url, r.snippet)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You searched for: {query}\n\nThese are the results:\n\n{listing}\n\n\
         Select the most promising link to explore, preferring credible sources, relevance to your \
         current learning goals and new information. Avoid results marked as already visited.\n\n\
         Respond with a JSON object containing the URL you want to visit like this:\n\
         {{\"url\": \"the-url-to-visit\"}}"
    )
}

pub fn already_visited(url: &str) -> String {
    format!(
        "You've already visited {url}. Please choose a different page to visit or a new search query.\n\n{NEXT_ACTION_FORMAT}"
    )
}

pub fn fetch_failed(url: &str, reason: &str) -> String {
    format!(
        "The page {url} could not be loaded ({reason}). Please choose a different page to visit or a new search query.\n\n{NEXT_ACTION_FORMAT}"
    )
}

pub fn topics(reflection: &str) -> String {
    format!(
        "This is your reflection on the page you just read:\n\n{reflection}\n\n\
         Identify 1-3 main topics or concepts covered. Respond with a JSON array of strings."
    )
}

pub fn new_direction(topics: &[String], recent: &[MemoryRecord]) -> String {
    let mut prompt = format!("You've explored several topics so far:\n{}\n", topics.join(", "));
    if !recent.is_empty() {
        prompt.push_str("\nYour most recent memories:\n");
        for record in recent {
            prompt.push_str(&format!("- {}: {}\n", record.source_url, record.preview(200)));
        }
    }
    prompt.push_str(
        "\nSuggest a new topic or concept to explore that would complement what you've learned but take \
         your knowledge in a new direction.\nReturn your suggestion as a simple string (no explanation needed).",
    );
    prompt
}

/// Retry prompt, with the reply that could not be understood for context.
pub fn retry(previous: &str) -> String {
    let previous: String = previous.chars().take(500).collect();
    if previous.trim().is_empty() {
        return RETRY_PROMPT.to_string();
    }
    format!("Your previous reply was:\n\n{}\n\n{}", previous.trim(), RETRY_PROMPT)
}

//! HTML text and link extraction

use super::PageLink;
use crate::urls;
use scraper::{Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose text never reaches the reader
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub(crate) fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) struct HtmlContent {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<PageLink>,
}

pub(crate) fn parse(html: &str, base_url: &str, link_limit: usize) -> HtmlContent {
    let document = Html::parse_document(html);

    HtmlContent {
        title: title(&document),
        text: visible_text(&document),
        links: links(&document, base_url, link_limit),
    }
}

fn title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let elem = document.select(&selector).next()?;
    let title = compact_ws(&elem.text().collect::<Vec<_>>().join(" "));
    (!title.is_empty()).then_some(title)
}

fn visible_text(document: &Html) -> String {
    let mut chunks: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed);
        }
    }

    compact_ws(&chunks.join(" "))
}

fn links(document: &Html, base_url: &str, link_limit: usize) -> Vec<PageLink> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for anchor in document.select(&selector) {
        if out.len() >= link_limit {
            break;
        }

        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let resolved = match &base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(resolved) = resolved else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let url = resolved.to_string();
        if !seen.insert(urls::normalize(&url)) {
            continue;
        }

        let label = compact_ws(&anchor.text().collect::<Vec<_>>().join(" "));
        out.push(PageLink {
            label: if label.is_empty() {
                "[No text]".to_string()
            } else {
                label
            },
            url,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><head><title> Deontic  logic </title>
        <style>body { color: red; }</style>
        <script>var tracking = "secret";</script></head>
        <body><h1>Deontic logic</h1>
        <p>Deontic logic is the field of
           philosophical logic concerned with obligation.</p>
        <a href="/wiki/Modal_logic">Modal logic</a>
        <a href="https://plato.stanford.edu/entries/logic-deontic/#Intro"></a>
        <a href="/wiki/Modal_logic#History">Modal logic again</a>
        <a href="mailto:someone@example.org">mail</a>
        <a href="#top">top</a>
        </body></html>"##;

    #[test]
    fn test_text_skips_script_and_style() {
        let content = parse(PAGE, "https://en.wikipedia.org/wiki/Deontic_logic", 100);
        assert_eq!(content.title.as_deref(), Some("Deontic logic"));
        assert!(content.text.contains("philosophical logic concerned with obligation."));
        assert!(!content.text.contains("tracking"));
        assert!(!content.text.contains("color: red"));
        assert!(!content.text.contains("  "));
    }

    #[test]
    fn test_links_resolved_filtered_and_deduplicated() {
        let content = parse(PAGE, "https://en.wikipedia.org/wiki/Deontic_logic", 100);
        let urls: Vec<&str> = content.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/wiki/Modal_logic",
                "https://plato.stanford.edu/entries/logic-deontic/#Intro",
            ]
        );
        assert_eq!(content.links[0].label, "Modal logic");
        assert_eq!(content.links[1].label, "[No text]");
    }

    #[test]
    fn test_link_limit() {
        let body: String = (0..150)
            .map(|i| format!("<a href=\"/page/{i}\">p{i}</a>"))
            .collect();
        let html = format!("<html><body>{body}</body></html>");
        let content = parse(&html, "https://example.org/", 100);
        assert_eq!(content.links.len(), 100);
        assert_eq!(content.links[99].url, "https://example.org/page/99");
    }
}

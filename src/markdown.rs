//! Markdown to sanitized HTML.
//!
//! Bodies are rendered once, when they are written, and the HTML is stored next to the
//! source. Bare URLs in text are turned into links before sanitizing.

use std::{collections::HashSet, sync::LazyLock};

use pulldown_cmark::{html, CowStr, Event, LinkType, Parser, Tag, TagEnd};
use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>()]+[^\s<>().,;:!?]").expect("valid url regex"));

#[derive(Debug, Clone, Copy)]
pub enum AllowedTags {
    /// Group descriptions, block elements included.
    Description,
    /// Comments, inline elements only.
    Comment,
}

impl AllowedTags {
    fn tags(&self) -> HashSet<&'static str> {
        let inline = ["a", "abbr", "acronym", "b", "code", "em", "i", "strong"];
        match self {
            Self::Comment => inline.into_iter().collect(),
            Self::Description => inline
                .into_iter()
                .chain(["blockquote", "li", "ol", "pre", "ul", "h1", "h2", "h3", "p"])
                .collect(),
        }
    }
}

pub fn render(source: &str, allowed: AllowedTags) -> String {
    let events = linkify(Parser::new(source));
    let mut unsafe_html = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut unsafe_html, events.into_iter());

    ammonia::Builder::default()
        .tags(allowed.tags())
        .link_rel(Some("nofollow"))
        .clean(&unsafe_html)
        .to_string()
}

/// Splits text events around bare URLs, leaving existing links and code untouched.
fn linkify<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut depth = 0usize;
    for event in parser {
        match event {
            Event::Start(tag @ (Tag::Link { .. } | Tag::CodeBlock(_))) => {
                depth += 1;
                events.push(Event::Start(tag));
            }
            Event::End(end @ (TagEnd::Link | TagEnd::CodeBlock)) => {
                depth = depth.saturating_sub(1);
                events.push(Event::End(end));
            }
            Event::Text(text) if depth == 0 && URL_RE.is_match(&text) => {
                let mut last = 0;
                for found in URL_RE.find_iter(&text) {
                    if found.start() > last {
                        events.push(Event::Text(CowStr::from(text[last..found.start()].to_owned())));
                    }
                    let url = found.as_str().to_owned();
                    events.push(Event::Start(Tag::Link {
                        link_type: LinkType::Autolink,
                        dest_url: CowStr::from(url.clone()),
                        title: CowStr::from(""),
                        id: CowStr::from(""),
                    }));
                    events.push(Event::Text(CowStr::from(url)));
                    events.push(Event::End(TagEnd::Link));
                    last = found.end();
                }
                if last < text.len() {
                    events.push(Event::Text(CowStr::from(text[last..].to_owned())));
                }
            }
            other => events.push(other),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_keeps_block_tags() {
        let html = render("# Trip\n\n* one\n* two", AllowedTags::Description);
        assert!(html.contains("<h1>Trip</h1>"));
        assert!(html.contains("<ul>"));
        assert!(html.contains("<li>one</li>"));
    }

    #[test]
    fn test_comment_strips_block_tags() {
        let html = render("# Trip\n\n**fast**", AllowedTags::Comment);
        assert!(!html.contains("<h1>"));
        assert!(!html.contains("<p>"));
        assert!(html.contains("<strong>fast</strong>"));
        assert!(html.contains("Trip"));
    }

    #[test]
    fn test_scripts_are_removed() {
        let html = render(
            "hello <script>alert(1)</script> <img src=x onerror=alert(1)>",
            AllowedTags::Description,
        );
        assert!(!html.contains("<script"));
        assert!(!html.contains("alert(1)</script>"));
        assert!(!html.contains("<img"));
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn test_bare_urls_are_linkified() {
        let html = render("meet at https://example.com/map.", AllowedTags::Comment);
        assert!(html.contains("href=\"https://example.com/map\""));
        assert!(html.contains("rel=\"nofollow\""));
        assert!(html.contains(">https://example.com/map</a>."));
    }

    #[test]
    fn test_existing_links_are_not_nested() {
        let html = render("[map](https://example.com/map)", AllowedTags::Comment);
        assert_eq!(html.matches("<a ").count(), 1);
    }

    #[test]
    fn test_javascript_links_are_dropped() {
        let html = render("[click](javascript:alert(1))", AllowedTags::Comment);
        assert!(!html.contains("javascript:"));
    }
}

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Absolute, fragment-free URLs of every `selector` match whose `href` passes `keep`,
/// de-duplicated in document order.
pub fn collect_links<F>(document: &Html, base: &Url, selector: &Selector, keep: F) -> Vec<String>
where
    F: Fn(&Url) -> bool,
{
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut url) = base.join(href.trim()) else {
            continue;
        };
        url.set_fragment(None);
        if !matches!(url.scheme(), "http" | "https") || !keep(&url) {
            continue;
        }
        let link = url.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

/// Same host as `base` and a path one or more segments below `prefix`.
pub fn is_below(url: &Url, base: &Url, prefix: &str) -> bool {
    let host = |u: &Url| u.host_str().map(|h| h.trim_start_matches("www.").to_string());
    if host(url) != host(base) {
        return false;
    }
    url.path()
        .strip_prefix(prefix)
        .map(|rest| rest.trim_matches('/'))
        .is_some_and(|rest| !rest.is_empty())
}

/// `content` of a `<meta property=..>` or `<meta name=..>` tag.
pub fn meta_content(document: &Html, key: &str) -> Option<String> {
    let css = format!("meta[property=\"{key}\"], meta[name=\"{key}\"]");
    let selector = Selector::parse(&css).ok()?;
    document
        .select(&selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first non-empty match.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|e| element_text(&e))
        .find(|t| !t.is_empty())
}

/// Text of every non-empty match.
pub fn all_text(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
        .collect()
}

/// First value of `attr` across the matches.
pub fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

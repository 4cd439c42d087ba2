//! Listing page parser
//!
//! This module turns one fetched listing page into:
//! - The raw items on it, in page order (newest first)
//! - The URL of the next, older page, if the page links one
//!
//! It also extracts the main body text of an item's own page. Missing or
//! malformed markup is tolerated everywhere: an item without a date or
//! snippet is still an item, it just carries less evidence.

use crate::dates::parse_date_text;
use crate::state::PaginationEnd;
use crate::url::canonicalize_url;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Item container selectors, tried in order; the first that matches anything wins
const ITEM_SELECTORS: [&str; 6] = [
    "article",
    ".post",
    ".blog-post",
    ".entry",
    r#"[class*="post"]"#,
    ".hentry",
];

/// Older-page link selectors, tried in order
const NEXT_PAGE_SELECTORS: [&str; 4] = [
    r#"a[title*="Older"]"#,
    ".blog-pager-older-link",
    r#"a[rel="next"]"#,
    r#".blog-pager a[href*="max-results"]"#,
];

/// Body containers of an item's own page, tried in order
const CONTENT_SELECTORS: [&str; 5] = [
    ".post-body",
    ".entry-content",
    ".content",
    "article",
    ".post",
];

/// Elements whose text is never content
const CHROME_ELEMENTS: [&str; 7] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside",
];

/// Pagination parameters that carry the page's window date
const WINDOW_PARAMS: [&str; 2] = ["updated-max", "published-max"];

static FALLBACK_CONTAINER_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)post|entry|article").expect("container regex is valid"));

/// Structural hints about where an item sat on its listing page
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    /// Outer HTML of the item's container element
    pub fragment_html: String,

    /// Zero-based position among the page's items
    pub position: usize,

    /// Date the page's own pagination parameters place it at, if any
    pub window_date: Option<NaiveDate>,
}

/// One item found on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// The item's canonical link; identity is derived from it
    pub source_url: Url,

    /// The absolute link as it appeared on the page; requests go here
    pub link: Url,
    pub title: String,

    /// Inline text, at most the configured snippet length
    pub snippet: String,
    pub context: PageContext,
}

/// Everything extracted from one listing page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Items in page order
    pub items: Vec<RawItem>,

    /// The older page's absolute URL as linked, before loop checks
    pub next_page: Option<Url>,

    /// One message per item container that could not become an item
    pub anomalies: Vec<String>,
}

/// Where pagination goes after the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    Continue(Url),
    End(PaginationEnd),
}

/// Extracts items and the older-page link from a listing page
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - The page's URL, used to resolve relative links and derive the window date
/// * `fetched_at` - When the page was fetched, the reference for relative window dates
/// * `snippet_len` - Maximum snippet length in characters
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use sumi_chronicle::crawler::extract_page;
/// use url::Url;
///
/// let html = r#"<html><body>
///     <article><h3 class="post-title"><a href="/2015/03/a.html">A</a></h3><p>Body</p></article>
///     <a class="blog-pager-older-link" href="/search?updated-max=2015-03-01T00:00:00Z">Older</a>
/// </body></html>"#;
/// let page = Url::parse("https://example.com/").unwrap();
/// let extracted = extract_page(html, &page, Utc::now(), 200);
/// assert_eq!(extracted.items.len(), 1);
/// assert_eq!(extracted.items[0].title, "A");
/// assert!(extracted.next_page.is_some());
/// ```
pub fn extract_page(
    html: &str,
    page_url: &Url,
    fetched_at: DateTime<Utc>,
    snippet_len: usize,
) -> ExtractedPage {
    let document = Html::parse_document(html);
    let window_date = window_date(page_url, fetched_at);

    let mut extracted = ExtractedPage {
        next_page: find_next_page(&document, page_url),
        ..Default::default()
    };

    for (position, container) in item_containers(&document).into_iter().enumerate() {
        match extract_item(container, page_url, snippet_len) {
            Ok((link, source_url, title, snippet)) => extracted.items.push(RawItem {
                source_url,
                link,
                title,
                snippet,
                context: PageContext {
                    fragment_html: container.html(),
                    position,
                    window_date,
                },
            }),
            Err(message) => {
                tracing::warn!("Skipping item {} on {}: {}", position, page_url, message);
                extracted.anomalies.push(message);
            }
        }
    }

    tracing::debug!(
        "Extracted {} items ({} anomalies) from {}",
        extracted.items.len(),
        extracted.anomalies.len(),
        page_url
    );

    extracted
}

/// Applies the loop checks to a candidate older-page link
///
/// A missing link, a link back to the current page, and a link to a page
/// already visited in this run all end pagination, each with its own
/// [`PaginationEnd`]. URLs are compared in canonical form.
///
/// # Arguments
///
/// * `candidate` - The link found on the page, if any
/// * `current` - The page just processed
/// * `visited` - Canonical forms of every page visited in this run
pub fn resolve_next_page(
    candidate: Option<Url>,
    current: &Url,
    visited: &HashSet<String>,
) -> NextPage {
    let Some(candidate) = candidate else {
        return NextPage::End(PaginationEnd::Exhausted);
    };

    let Ok(canonical) = canonicalize_url(candidate.as_str()) else {
        tracing::warn!("Older-page link {} cannot be canonicalized", candidate);
        return NextPage::End(PaginationEnd::Exhausted);
    };

    let current_canonical = canonicalize_url(current.as_str())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| current.to_string());

    if canonical.as_str() == current_canonical {
        return NextPage::End(PaginationEnd::SelfLink);
    }

    if visited.contains(canonical.as_str()) {
        return NextPage::End(PaginationEnd::Revisited);
    }

    NextPage::Continue(candidate)
}

/// Extracts the main body text of an item's own page
///
/// Script, style and navigation chrome are left out. Returns `None` when no
/// body container is found or it holds no text.
pub fn extract_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    CONTENT_SELECTORS.iter().find_map(|selector| {
        let selector = Selector::parse(selector).ok()?;
        let element = document.select(&selector).next()?;
        let text = visible_text(element);
        (!text.is_empty()).then_some(text)
    })
}

/// Reads the window date from the page's pagination parameters
fn window_date(page_url: &Url, fetched_at: DateTime<Utc>) -> Option<NaiveDate> {
    page_url
        .query_pairs()
        .find(|(key, _)| WINDOW_PARAMS.contains(&key.as_ref()))
        .and_then(|(_, value)| {
            // An unescaped '+' in the offset arrives as a space
            parse_date_text(&value.replace(' ', "+"), fetched_at)
                .or_else(|| parse_date_text(&value, fetched_at))?
                .value
                .complete()
        })
}

fn item_containers(document: &Html) -> Vec<ElementRef<'_>> {
    for selector in ITEM_SELECTORS {
        if let Ok(sel) = Selector::parse(selector) {
            let found: Vec<_> = document.select(&sel).collect();
            if !found.is_empty() {
                return found;
            }
        }
    }

    // Last resort: any div whose class looks like an item container
    let Ok(div) = Selector::parse("div[class]") else {
        return Vec::new();
    };
    document
        .select(&div)
        .filter(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| FALLBACK_CONTAINER_CLASS.is_match(class))
        })
        .collect()
}

fn extract_item(
    container: ElementRef<'_>,
    page_url: &Url,
    snippet_len: usize,
) -> Result<(Url, Url, String, String), String> {
    let title_element = first_match(
        container,
        r#"h1[class*="title"], h2[class*="title"], h3[class*="title"]"#,
    )
    .or_else(|| first_match(container, "h1, h2, h3"));

    let title = title_element
        .map(normalized_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let link = title_element
        .and_then(|t| first_match(t, "a[href]"))
        .or_else(|| first_match(container, "a[href]"))
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| "no item link".to_string())?;

    let absolute = resolve_link(link, page_url)
        .ok_or_else(|| format!("unusable item link '{}'", link))?;
    let source_url = canonicalize_url(absolute.as_str())
        .map_err(|e| format!("item link {} cannot be canonicalized: {}", absolute, e))?;

    let snippet = first_match(
        container,
        ".post-body, .entry-content, .content, .post-snippet, .snippet",
    )
    .or_else(|| first_match(container, "div, p"))
    .map(visible_text)
    .map(|text| truncate_chars(&text, snippet_len))
    .unwrap_or_default();

    Ok((absolute, source_url, title, snippet))
}

fn find_next_page(document: &Html, page_url: &Url) -> Option<Url> {
    for selector in NEXT_PAGE_SELECTORS {
        if let Ok(sel) = Selector::parse(selector) {
            let found = document
                .select(&sel)
                .filter_map(|el| el.value().attr("href"))
                .find_map(|href| resolve_link(href, page_url));
            if found.is_some() {
                return found;
            }
        }
    }

    // Fall back to any link whose text mentions older posts
    let anchor = Selector::parse("a[href]").ok()?;
    document
        .select(&anchor)
        .filter(|a| normalized_text(*a).to_lowercase().contains("older"))
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| resolve_link(href, page_url))
}

/// Resolves an href to an absolute HTTP(S) URL
///
/// Returns None for javascript:, mailto:, tel: and data: links, fragment-only
/// links and anything that does not resolve to HTTP(S).
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

fn first_match<'a>(element: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    element.select(&selector).next()
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element with chrome elements left out, whitespace collapsed
fn visible_text(element: ElementRef<'_>) -> String {
    let mut words: Vec<&str> = Vec::new();

    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_chrome = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| CHROME_ELEMENTS.contains(&el.name()))
        });
        if !in_chrome {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

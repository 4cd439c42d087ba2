//! The date resolution cascade
//!
//! Strategies are plain functions tried in a fixed order, highest intrinsic
//! reliability first. Evaluation is lazy: once a strategy yields a value that
//! completes to a real calendar date, nothing below it runs.

use super::parse::{parse_date_text, scan_free_text, ParsedDate, PartialDate};
use super::validate;
use super::{Confidence, DateStrategy, ResolvedDate};
use crate::crawler::{extract_content, RawItem};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

static URL_FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/|-(\d{4})-(\d{2})-(\d{2})(?:[./-]|$)")
        .expect("URL full date regex is valid")
});

static URL_YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{4})/(\d{2})/").expect("URL year-month regex is valid")
});

/// JSON-LD keys that carry a publication timestamp, in preference order
const PUBLISHED_KEYS: [&str; 3] = ["datePublished", "dateCreated", "publishedDate"];

/// Meta tags describing publication time (modification times excluded)
const META_SELECTORS: [&str; 7] = [
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="date"]"#,
    r#"meta[name="publish_date"]"#,
    r#"meta[name="publication_date"]"#,
    r#"meta[name="DC.date.issued"]"#,
    r#"meta[itemprop="datePublished"]"#,
    r#"meta[itemprop="dateCreated"]"#,
];

/// Item-level date elements, paired with the attribute holding the value
/// (`None` means the element's text)
const MARKUP_SELECTORS: [(&str, Option<&str>); 11] = [
    ("time[datetime]", Some("datetime")),
    (r#"[itemprop="datePublished"][content]"#, Some("content")),
    ("abbr.published[title]", Some("title")),
    (r#"[itemprop="datePublished"]"#, None),
    ("time", None),
    (".date-header", None),
    (".entry-date", None),
    (".post-date", None),
    (".published", None),
    (r#"[class*="date"]"#, None),
    (r#"[class*="publish"]"#, None),
];

/// Everything the cascade may look at for one item
#[derive(Debug, Clone, Copy)]
pub struct DateEvidence<'a> {
    /// The item as extracted from the listing page
    pub item: &'a RawItem,

    /// The item's own page, when it was fetched
    pub detail_html: Option<&'a str>,

    /// When the evidence was fetched; relative dates resolve against it
    pub fetched_at: DateTime<Utc>,
}

impl<'a> DateEvidence<'a> {
    /// Evidence from the listing page only
    pub fn listing(item: &'a RawItem, fetched_at: DateTime<Utc>) -> Self {
        Self {
            item,
            detail_html: None,
            fetched_at,
        }
    }

    /// Adds the item's own page to the evidence
    pub fn with_detail(mut self, detail_html: Option<&'a str>) -> Self {
        self.detail_html = detail_html;
        self
    }
}

/// A strategy's raw finding before normalization
struct Found {
    parsed: ParsedDate,
    raw: String,
}

type StrategyFn = fn(&DateEvidence<'_>) -> Option<Found>;

const CASCADE: [(DateStrategy, Confidence, StrategyFn); 5] = [
    (DateStrategy::StructuredData, Confidence::High, from_structured_data),
    (DateStrategy::MetaTag, Confidence::High, from_meta_tags),
    (DateStrategy::UrlPattern, Confidence::Medium, from_url),
    (DateStrategy::ItemMarkup, Confidence::Medium, from_item_markup),
    (DateStrategy::ContentText, Confidence::Low, from_content_text),
];

/// Resolves publication dates for one source
#[derive(Debug, Clone, Default)]
pub struct DateResolver {
    earliest: Option<NaiveDate>,
}

impl DateResolver {
    /// Creates a resolver
    ///
    /// # Arguments
    ///
    /// * `earliest` - The source's earliest possible date; earlier results are flagged
    pub fn new(earliest: Option<NaiveDate>) -> Self {
        Self { earliest }
    }

    /// Runs the cascade over `evidence`
    ///
    /// Never fails: when no strategy succeeds the result has `Unknown`
    /// confidence and no date.
    pub fn resolve(&self, evidence: &DateEvidence<'_>) -> ResolvedDate {
        let item = evidence.item;

        let hit = CASCADE.iter().find_map(|(strategy, base, run)| {
            let found = run(evidence)?;
            let date = found.parsed.value.complete()?;
            Some((*strategy, *base, found, date))
        });

        let Some((strategy, base, found, date)) = hit else {
            tracing::debug!("No date evidence for {}", item.source_url);
            return ResolvedDate::unresolved();
        };

        let confidence = match found.parsed.value {
            PartialDate::Relative(_) => Confidence::Low,
            value => base.demote(value.demotion()),
        };

        let warnings = validate::check(
            date,
            &item.source_url,
            item.context.window_date,
            self.earliest,
            evidence.fetched_at.date_naive(),
        );

        if warnings.is_empty() {
            tracing::debug!(
                "Resolved {} to {} via {} ({})",
                item.source_url,
                date,
                strategy,
                confidence
            );
        } else {
            tracing::warn!(
                "Resolved {} to {} via {} with warnings: {:?}",
                item.source_url,
                date,
                strategy,
                warnings
            );
        }

        ResolvedDate {
            date: Some(date),
            time: found.parsed.time,
            confidence,
            strategy,
            raw: Some(found.raw),
            warnings,
        }
    }
}

fn from_structured_data(evidence: &DateEvidence<'_>) -> Option<Found> {
    let document = Html::parse_document(evidence.detail_html?);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    document.select(&selector).find_map(|script| {
        let body: String = script.text().collect();
        let value: Value = serde_json::from_str(body.trim()).ok()?;
        let raw = find_published(&value)?;
        let parsed = parse_date_text(raw, evidence.fetched_at)?;
        Some(Found {
            parsed,
            raw: raw.to_string(),
        })
    })
}

/// Finds a publication timestamp in a JSON-LD value (object, array or `@graph`)
fn find_published(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => PUBLISHED_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .or_else(|| map.get("@graph").and_then(find_published)),
        Value::Array(items) => items.iter().find_map(find_published),
        _ => None,
    }
}

fn from_meta_tags(evidence: &DateEvidence<'_>) -> Option<Found> {
    let document = Html::parse_document(evidence.detail_html?);

    META_SELECTORS.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).find_map(|meta| {
            let raw = meta.value().attr("content")?;
            let parsed = parse_date_text(raw, evidence.fetched_at)?;
            Some(Found {
                parsed,
                raw: raw.to_string(),
            })
        })
    })
}

fn from_url(evidence: &DateEvidence<'_>) -> Option<Found> {
    let path = evidence.item.source_url.path();

    for caps in URL_FULL_DATE.captures_iter(path) {
        let (y, m, d) = match (caps.get(1), caps.get(4)) {
            (Some(_), _) => (&caps[1], &caps[2], &caps[3]),
            (None, Some(_)) => (&caps[4], &caps[5], &caps[6]),
            _ => continue,
        };
        if let Some(date) =
            NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
        {
            return Some(Found {
                parsed: ParsedDate {
                    value: PartialDate::Full(date),
                    time: None,
                },
                raw: format!("{}-{}-{}", y, m, d),
            });
        }
    }

    let caps = URL_YEAR_MONTH.captures(path)?;
    let month: u32 = caps[2].parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(Found {
        parsed: ParsedDate {
            value: PartialDate::YearMonth {
                year: caps[1].parse().ok()?,
                month,
            },
            time: None,
        },
        raw: format!("{}-{}", &caps[1], &caps[2]),
    })
}

fn from_item_markup(evidence: &DateEvidence<'_>) -> Option<Found> {
    let fragment = Html::parse_fragment(&evidence.item.context.fragment_html);

    MARKUP_SELECTORS.iter().find_map(|(css, attr)| {
        let selector = Selector::parse(css).ok()?;
        fragment.select(&selector).find_map(|element| {
            let raw = match attr {
                Some(name) => element.value().attr(name)?.trim().to_string(),
                None => element
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            };
            let parsed = parse_date_text(&raw, evidence.fetched_at)?;
            Some(Found { parsed, raw })
        })
    })
}

fn from_content_text(evidence: &DateEvidence<'_>) -> Option<Found> {
    let fragment = Html::parse_fragment(&evidence.item.context.fragment_html);
    let listing_text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    let detail_text = evidence.detail_html.and_then(extract_content);

    [Some(listing_text), detail_text]
        .into_iter()
        .flatten()
        .find_map(|text| {
            let (parsed, raw) = scan_free_text(&text, evidence.fetched_at)?;
            Some(Found { parsed, raw })
        })
}

//! Publication date resolution
//!
//! Every raw item goes through an ordered cascade of independent strategies.
//! The first strategy that yields a structurally valid date wins; lower
//! strategies are never consulted after that, even when the winning value
//! looks suspicious. Suspicion only produces [`DateWarning`]s.
//!
//! # Components
//!
//! - `parse`: Free-form date text to a possibly partial calendar value
//! - `cascade`: The strategy table and [`DateResolver`]
//! - `validate`: Plausibility checks that annotate but never discard

mod cascade;
mod parse;
mod validate;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::fmt;

pub use cascade::{DateEvidence, DateResolver};
pub use parse::{parse_date_text, scan_free_text, ParsedDate, PartialDate};
pub use validate::url_year;

/// Coarse reliability of a resolved date
///
/// Variants are declared from least to most reliable so that `Ord` ranks
/// them (`High > Medium > Low > Unknown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Unknown,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lowers the confidence by `levels`, never below `Low`
    ///
    /// `Unknown` is not a level on this scale and is returned unchanged.
    pub fn demote(self, levels: u8) -> Self {
        if self == Self::Unknown {
            return self;
        }
        let mut current = self;
        for _ in 0..levels {
            current = match current {
                Self::High => Self::Medium,
                _ => Self::Low,
            };
        }
        current
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns all confidence levels, most reliable first
    pub fn all_levels() -> [Self; 4] {
        [Self::High, Self::Medium, Self::Low, Self::Unknown]
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Identifies which strategy produced a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStrategy {
    /// JSON-LD publication timestamp on the item's own page
    StructuredData,

    /// Publication meta tag on the item's own page
    MetaTag,

    /// Date segment in the canonical URL path
    UrlPattern,

    /// Date label or byline element in the item's markup
    ItemMarkup,

    /// Date expression anywhere in the item's text
    ContentText,

    /// No strategy succeeded
    None,
}

impl DateStrategy {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::StructuredData => "structured_data",
            Self::MetaTag => "meta_tag",
            Self::UrlPattern => "url_pattern",
            Self::ItemMarkup => "item_markup",
            Self::ContentText => "content_text",
            Self::None => "none",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "structured_data" => Some(Self::StructuredData),
            "meta_tag" => Some(Self::MetaTag),
            "url_pattern" => Some(Self::UrlPattern),
            "item_markup" => Some(Self::ItemMarkup),
            "content_text" => Some(Self::ContentText),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for DateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A validation annotation on a resolved date
///
/// The date is always kept; warnings exist for triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateWarning {
    /// Earlier than the source's earliest possible date
    #[serde(rename = "before_earliest_date")]
    BeforeEarliest,

    /// Later than the fetch time
    #[serde(rename = "future_date")]
    InFuture,

    /// Year differs from a year embedded in the URL by more than one
    UrlYearMismatch,

    /// More than a year away from the listing page's window date
    WindowDateMismatch,
}

impl DateWarning {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::BeforeEarliest => "before_earliest_date",
            Self::InFuture => "future_date",
            Self::UrlYearMismatch => "url_year_mismatch",
            Self::WindowDateMismatch => "window_date_mismatch",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "before_earliest_date" => Some(Self::BeforeEarliest),
            "future_date" => Some(Self::InFuture),
            "url_year_mismatch" => Some(Self::UrlYearMismatch),
            "window_date_mismatch" => Some(Self::WindowDateMismatch),
            _ => None,
        }
    }

    /// Joins warnings into the comma-separated form stored in the database
    pub fn join(warnings: &[DateWarning]) -> String {
        warnings
            .iter()
            .map(|w| w.to_db_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Splits the stored comma-separated form, skipping unknown codes
    pub fn split(stored: &str) -> Vec<DateWarning> {
        stored
            .split(',')
            .filter_map(|code| Self::from_db_string(code.trim()))
            .collect()
    }
}

impl fmt::Display for DateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The outcome of running the cascade over one item
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDate {
    /// Calendar date, absent only when confidence is `Unknown`
    pub date: Option<NaiveDate>,

    /// Time of day, when the evidence carried one
    pub time: Option<NaiveTime>,

    pub confidence: Confidence,
    pub strategy: DateStrategy,

    /// The evidence text the date was parsed from
    pub raw: Option<String>,

    pub warnings: Vec<DateWarning>,
}

impl ResolvedDate {
    /// The result when every strategy came up empty
    pub fn unresolved() -> Self {
        Self {
            date: None,
            time: None,
            confidence: Confidence::Unknown,
            strategy: DateStrategy::None,
            raw: None,
            warnings: Vec::new(),
        }
    }

    /// Returns true if the item should be looked at by a person
    pub fn needs_review(&self) -> bool {
        self.confidence == Confidence::Unknown || !self.warnings.is_empty()
    }
}

//! Plausibility checks for resolved dates
//!
//! A check that fails adds a [`DateWarning`]; it never replaces or drops the
//! date.

use super::DateWarning;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static URL_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/|-)((?:19|20)\d{2})(?:/|-)\d{2}(?:/|-|\.|$)").expect("URL year regex is valid")
});

/// Maximum distance between two dates before they are said to disagree
const MAX_DISAGREEMENT_DAYS: i64 = 366;

/// Returns the year embedded in a URL path, if any
///
/// Recognizes `/YYYY/MM/` segments and `-YYYY-MM-DD` suffixes.
pub fn url_year(url: &Url) -> Option<i32> {
    URL_YEAR
        .captures(url.path())
        .and_then(|caps| caps[1].parse().ok())
}

/// Collects every warning that applies to `date`
///
/// # Arguments
///
/// * `date` - The resolved calendar date
/// * `item_url` - The item's canonical URL, cross-checked for an embedded year
/// * `window_date` - The listing page's inferred window date, if any
/// * `earliest` - The source's earliest possible date, if configured
/// * `today` - The fetch date
pub fn check(
    date: NaiveDate,
    item_url: &Url,
    window_date: Option<NaiveDate>,
    earliest: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<DateWarning> {
    let mut warnings = Vec::new();

    if earliest.is_some_and(|earliest| date < earliest) {
        warnings.push(DateWarning::BeforeEarliest);
    }

    if date > today {
        warnings.push(DateWarning::InFuture);
    }

    if let Some(year) = url_year(item_url) {
        if (date.year() - year).abs() > 1 {
            warnings.push(DateWarning::UrlYearMismatch);
        }
    }

    if let Some(window) = window_date {
        if (date - window).num_days().abs() > MAX_DISAGREEMENT_DAYS {
            warnings.push(DateWarning::WindowDateMismatch);
        }
    }

    warnings
}

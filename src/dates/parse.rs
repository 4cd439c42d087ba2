//! Free-form date text parsing
//!
//! Turns evidence strings ("2015-03-14T10:00:00-08:00", "March 14, 2015",
//! "2015-03", "3 years ago") into a possibly partial calendar value. Completion
//! of partial values and the matching confidence demotion happen in the
//! cascade, not here.

use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Free-text matches outside this range are treated as noise
const MIN_PLAUSIBLE_YEAR: i32 = 1990;

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("ISO date regex is valid")
});

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
    .expect("month-day-year regex is valid")
});

static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b",
    )
    .expect("day-month-year regex is valid")
});

static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("slash date regex is valid")
});

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+|an?|one)\s+(day|week|month|year)s?\s+ago\b")
        .expect("relative date regex is valid")
});

static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b")
        .expect("month-year regex is valid")
});

static YEAR_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})$").expect("year-month regex is valid")
});

static YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("year regex is valid"));

/// A calendar value that may be missing its day or month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialDate {
    /// Year, month and day are all known
    Full(NaiveDate),

    /// Only year and month are known
    YearMonth { year: i32, month: u32 },

    /// Only the year is known
    Year(i32),

    /// Resolved from an "N units ago" expression against the fetch time
    Relative(NaiveDate),
}

impl PartialDate {
    /// Completes the value to a calendar date (first of month, January 1st)
    pub fn complete(&self) -> Option<NaiveDate> {
        match *self {
            Self::Full(date) | Self::Relative(date) => Some(date),
            Self::YearMonth { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            Self::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1),
        }
    }

    /// How many confidence levels completion costs
    pub fn demotion(&self) -> u8 {
        match self {
            Self::Full(_) | Self::Relative(_) => 0,
            Self::YearMonth { .. } => 1,
            Self::Year(_) => 2,
        }
    }

    pub fn year(&self) -> i32 {
        match *self {
            Self::Full(date) | Self::Relative(date) => date.year(),
            Self::YearMonth { year, .. } | Self::Year(year) => year,
        }
    }
}

/// A parsed date value plus its time of day, if the evidence had one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub value: PartialDate,
    pub time: Option<NaiveTime>,
}

impl ParsedDate {
    fn date_only(value: PartialDate) -> Self {
        Self { value, time: None }
    }
}

/// Parses a single date value such as a meta tag or `datetime` attribute
///
/// Exact machine formats (RFC 3339, RFC 2822, ISO without offset) are tried
/// first, then the bare `YYYY-MM` and `YYYY` forms, then the same textual
/// patterns used for free text.
///
/// # Arguments
///
/// * `text` - The evidence string
/// * `now` - Fetch time, used for relative expressions
pub fn parse_date_text(text: &str, now: DateTime<Utc>) -> Option<ParsedDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(parsed) = parse_exact(text) {
        return Some(parsed);
    }

    if let Some(caps) = YEAR_MONTH.captures(text) {
        let year = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        if (1..=12).contains(&month) {
            return Some(ParsedDate::date_only(PartialDate::YearMonth { year, month }));
        }
        return None;
    }

    if let Some(caps) = YEAR_ONLY.captures(text) {
        return Some(ParsedDate::date_only(PartialDate::Year(caps[1].parse().ok()?)));
    }

    scan(text, now, |_| true).map(|(parsed, _)| parsed)
}

/// Finds a date expression anywhere in running text
///
/// Only matches whose year is plausible for web content (not before 1990, not
/// after next year) are returned, together with the matched expression.
pub fn scan_free_text(text: &str, now: DateTime<Utc>) -> Option<(ParsedDate, String)> {
    let max_year = now.year() + 1;
    scan(text, now, |parsed| {
        (MIN_PLAUSIBLE_YEAR..=max_year).contains(&parsed.value.year())
    })
}

fn parse_exact(text: &str) -> Option<ParsedDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        let local = dt.naive_local();
        return Some(ParsedDate {
            value: PartialDate::Full(local.date()),
            time: Some(local.time()),
        });
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ParsedDate {
                value: PartialDate::Full(dt.date()),
                time: Some(dt.time()),
            });
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(ParsedDate::date_only(PartialDate::Full(date)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        let local = dt.naive_local();
        return Some(ParsedDate {
            value: PartialDate::Full(local.date()),
            time: Some(local.time()),
        });
    }

    None
}

type CaptureFn = fn(&Captures, NaiveDate) -> Option<PartialDate>;

fn scan(
    text: &str,
    now: DateTime<Utc>,
    accept: impl Fn(&ParsedDate) -> bool,
) -> Option<(ParsedDate, String)> {
    let today = now.date_naive();
    let patterns: [(&Regex, CaptureFn); 6] = [
        (&*ISO_DATE, from_iso),
        (&*MONTH_DAY_YEAR, from_month_day_year),
        (&*DAY_MONTH_YEAR, from_day_month_year),
        (&*SLASH_DATE, from_slash),
        (&*RELATIVE, from_relative),
        (&*MONTH_YEAR, from_month_year),
    ];

    for (regex, build) in patterns {
        for caps in regex.captures_iter(text) {
            if let Some(value) = build(&caps, today) {
                let parsed = ParsedDate::date_only(value);
                if accept(&parsed) {
                    return Some((parsed, caps[0].to_string()));
                }
            }
        }
    }

    None
}

fn from_iso(caps: &Captures, _today: NaiveDate) -> Option<PartialDate> {
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    Some(PartialDate::Full(date))
}

fn from_month_day_year(caps: &Captures, _today: NaiveDate) -> Option<PartialDate> {
    let month = month_from_name(&caps[1])?;
    let date = NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?)?;
    Some(PartialDate::Full(date))
}

fn from_day_month_year(caps: &Captures, _today: NaiveDate) -> Option<PartialDate> {
    let month = month_from_name(&caps[2])?;
    let date = NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[1].parse().ok()?)?;
    Some(PartialDate::Full(date))
}

/// `MM/DD/YYYY`, falling back to `DD/MM/YYYY` when the first field cannot be a month
fn from_slash(caps: &Captures, _today: NaiveDate) -> Option<PartialDate> {
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let (month, day) = if first > 12 { (second, first) } else { (first, second) };
    Some(PartialDate::Full(NaiveDate::from_ymd_opt(year, month, day)?))
}

fn from_relative(caps: &Captures, today: NaiveDate) -> Option<PartialDate> {
    let amount_text = caps[1].to_ascii_lowercase();
    let amount: u32 = match amount_text.as_str() {
        "a" | "an" | "one" => 1,
        digits => digits.parse().ok()?,
    };

    let date = match caps[2].to_ascii_lowercase().as_str() {
        "day" => today.checked_sub_days(Days::new(u64::from(amount)))?,
        "week" => today.checked_sub_days(Days::new(u64::from(amount) * 7))?,
        "month" => today.checked_sub_months(Months::new(amount))?,
        "year" => today.checked_sub_months(Months::new(amount.checked_mul(12)?))?,
        _ => return None,
    };

    Some(PartialDate::Relative(date))
}

fn from_month_year(caps: &Captures, _today: NaiveDate) -> Option<PartialDate> {
    Some(PartialDate::YearMonth {
        year: caps[2].parse().ok()?,
        month: month_from_name(&caps[1])?,
    })
}

fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rfc3339_keeps_local_date_and_time() {
        let parsed = parse_date_text("2015-03-14T23:30:00-08:00", now()).unwrap();
        assert_eq!(parsed.value, PartialDate::Full(ymd(2015, 3, 14)));
        assert_eq!(parsed.time, NaiveTime::from_hms_opt(23, 30, 0));
    }

    #[test]
    fn test_iso_without_offset() {
        let parsed = parse_date_text("2015-03-14T08:05:00", now()).unwrap();
        assert_eq!(parsed.value, PartialDate::Full(ymd(2015, 3, 14)));

        let parsed = parse_date_text("2015-03-14", now()).unwrap();
        assert_eq!(parsed.value, PartialDate::Full(ymd(2015, 3, 14)));
        assert_eq!(parsed.time, None);
    }

    #[test]
    fn test_year_month_and_year_only() {
        assert_eq!(
            parse_date_text("2015-03", now()).unwrap().value,
            PartialDate::YearMonth {
                year: 2015,
                month: 3
            }
        );
        assert_eq!(
            parse_date_text("2015", now()).unwrap().value,
            PartialDate::Year(2015)
        );
        assert!(parse_date_text("2015-13", now()).is_none());
    }

    #[test]
    fn test_textual_dates() {
        assert_eq!(
            parse_date_text("Saturday, March 14, 2015", now()).unwrap().value,
            PartialDate::Full(ymd(2015, 3, 14))
        );
        assert_eq!(
            parse_date_text("14th Sept. 2015", now()).unwrap().value,
            PartialDate::Full(ymd(2015, 9, 14))
        );
        assert_eq!(
            parse_date_text("03/14/2015", now()).unwrap().value,
            PartialDate::Full(ymd(2015, 3, 14))
        );
        assert_eq!(
            parse_date_text("14/03/2015", now()).unwrap().value,
            PartialDate::Full(ymd(2015, 3, 14))
        );
        assert_eq!(
            parse_date_text("March 2015", now()).unwrap().value,
            PartialDate::YearMonth {
                year: 2015,
                month: 3
            }
        );
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(
            parse_date_text("3 years ago", now()).unwrap().value,
            PartialDate::Relative(ymd(2021, 6, 15))
        );
        assert_eq!(
            parse_date_text("a month ago", now()).unwrap().value,
            PartialDate::Relative(ymd(2024, 5, 15))
        );
        assert_eq!(
            parse_date_text("2 weeks ago", now()).unwrap().value,
            PartialDate::Relative(ymd(2024, 6, 1))
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_date_text("", now()).is_none());
        assert!(parse_date_text("Read more", now()).is_none());
        assert!(parse_date_text("February 30, 2015", now()).is_none());
    }

    #[test]
    fn test_free_text_skips_implausible_years() {
        let text = "The battle of 1066-10-14 is retold here; revised 2015-03-20";
        let (parsed, matched) = scan_free_text(text, now()).unwrap();
        assert_eq!(parsed.value, PartialDate::Full(ymd(2015, 3, 20)));
        assert_eq!(matched, "2015-03-20");
    }

    #[test]
    fn test_free_text_finds_published_label() {
        let text = "A reflection on patience. Published: April 2, 2012. Comments closed.";
        assert_eq!(
            scan_free_text(text, now()).unwrap().0.value,
            PartialDate::Full(ymd(2012, 4, 2))
        );
    }

    #[test]
    fn test_completion_and_demotion() {
        let ym = PartialDate::YearMonth {
            year: 2015,
            month: 3,
        };
        assert_eq!(ym.complete(), Some(ymd(2015, 3, 1)));
        assert_eq!(ym.demotion(), 1);

        let y = PartialDate::Year(2015);
        assert_eq!(y.complete(), Some(ymd(2015, 1, 1)));
        assert_eq!(y.demotion(), 2);

        assert_eq!(PartialDate::Full(ymd(2015, 3, 14)).demotion(), 0);
    }
}

/// Stop reason definitions for traversal runs
///
/// This module defines every terminal classification a run can end with.
use std::fmt;

/// Which pagination condition ended the page chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationEnd {
    /// The page had no older-page link at all
    Exhausted,

    /// The older-page link pointed back at the current page
    SelfLink,

    /// The older-page link pointed at a page already visited in this run
    Revisited,
}

impl PaginationEnd {
    /// Converts to the database detail string
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::SelfLink => "self_link",
            Self::Revisited => "revisited",
        }
    }

    /// Parses from the database detail string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "exhausted" => Some(Self::Exhausted),
            "self_link" => Some(Self::SelfLink),
            "revisited" => Some(Self::Revisited),
            _ => None,
        }
    }
}

/// Represents why a traversal run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    // ===== Natural Ends =====
    /// There is no further older page to visit
    NoNextPage(PaginationEnd),

    /// The mode's page cap was reached
    PageLimitReached,

    /// Consecutive pages contributed nothing new (incremental mode)
    CaughtUp,

    // ===== Abnormal Ends =====
    /// A page could not be fetched after exhausting retries, or robots denied it
    FetchError,

    /// An external cancellation signal was observed
    Cancelled,

    /// An unrecoverable error such as an identity conflict
    Fatal,
}

impl StopReason {
    /// Returns true if the run ended without error
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::NoNextPage(_) | Self::PageLimitReached | Self::CaughtUp
        )
    }

    /// Returns true if the archive was complete up to the newest page when the
    /// run ended
    ///
    /// Incremental runs use this to decide whether a previous run left the
    /// archive caught up.
    pub fn archive_complete(&self) -> bool {
        matches!(self, Self::NoNextPage(_) | Self::CaughtUp)
    }

    /// Converts the stop reason to its database string representation
    ///
    /// Every pagination end maps to `no_next_page`; the specific condition is
    /// available from [`StopReason::detail`].
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NoNextPage(_) => "no_next_page",
            Self::PageLimitReached => "page_limit_reached",
            Self::CaughtUp => "caught_up",
            Self::FetchError => "fetch_error",
            Self::Cancelled => "cancelled",
            Self::Fatal => "fatal",
        }
    }

    /// Returns the extra detail stored alongside the reason, if any
    pub fn detail(&self) -> Option<&'static str> {
        match self {
            Self::NoNextPage(end) => Some(end.to_db_string()),
            _ => None,
        }
    }

    /// Parses a stop reason from its database columns
    ///
    /// A `no_next_page` row with a missing or unknown detail is read back as
    /// [`PaginationEnd::Exhausted`].
    pub fn from_db_parts(reason: &str, detail: Option<&str>) -> Option<Self> {
        match reason {
            "no_next_page" => Some(Self::NoNextPage(
                detail
                    .and_then(PaginationEnd::from_db_string)
                    .unwrap_or(PaginationEnd::Exhausted),
            )),
            "page_limit_reached" => Some(Self::PageLimitReached),
            "caught_up" => Some(Self::CaughtUp),
            "fetch_error" => Some(Self::FetchError),
            "cancelled" => Some(Self::Cancelled),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.to_db_string(), detail),
            None => write!(f, "{}", self.to_db_string()),
        }
    }
}

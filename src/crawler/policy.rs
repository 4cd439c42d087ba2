//! Operating modes and their stopping policies
//!
//! The three modes share every piece of engine logic. What differs is how
//! many pages a run may visit, whether it gives up early on pages that
//! contribute nothing new, and how often progress is checkpointed.

use crate::crawler::NextPage;
use crate::state::StopReason;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Page cap of an incremental run unless overridden
pub const INCREMENTAL_PAGE_CAP: u32 = 5;

/// Page cap of a bounded-historical run unless overridden
pub const BOUNDED_PAGE_CAP: u32 = 50;

/// Consecutive zero-new pages after which an incremental run is caught up
pub const INCREMENTAL_EARLY_STOP: u32 = 2;

/// Named operating mode of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Only the newest pages, stopping once nothing new turns up
    #[default]
    Incremental,

    /// Up to a configurable page cap
    BoundedHistorical,

    /// Until the pagination chain ends
    FullHistorical,
}

impl Mode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::BoundedHistorical => "bounded-historical",
            Self::FullHistorical => "full-historical",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "incremental" => Some(Self::Incremental),
            "bounded-historical" => Some(Self::BoundedHistorical),
            "full-historical" => Some(Self::FullHistorical),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(s).ok_or_else(|| {
            format!(
                "unknown mode '{}' (expected incremental, bounded-historical or full-historical)",
                s
            )
        })
    }
}

/// Per-run progress the policy decides on
///
/// Owned by the traversal controller and passed to [`ModePolicy::decide`]
/// explicitly after every page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pages_visited: u32,
    pub total_new: u32,

    /// Consecutive most recent pages that accepted nothing
    pub zero_new_streak: u32,
}

impl Progress {
    /// Starts a run with a pre-existing zero-new streak
    pub fn seeded(zero_new_streak: u32) -> Self {
        Self {
            zero_new_streak,
            ..Self::default()
        }
    }

    /// Records one processed page and how many items it newly accepted
    pub fn record_page(&mut self, page_new: u32) {
        self.pages_visited += 1;
        self.total_new += page_new;
        if page_new == 0 {
            self.zero_new_streak += 1;
        } else {
            self.zero_new_streak = 0;
        }
    }
}

/// What the controller does after a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue(Url),
    Stop(StopReason),
}

/// Page cap, early-stop rule and checkpoint cadence of one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    pub mode: Mode,

    /// `None` means unbounded
    pub page_cap: Option<u32>,

    /// Stop as caught up after this many consecutive zero-new pages
    pub early_stop_after: Option<u32>,

    /// Checkpoint the run record every this many pages
    pub checkpoint_every: u32,
}

impl ModePolicy {
    /// Builds the policy of `mode`, optionally overriding its page cap
    ///
    /// # Arguments
    ///
    /// * `mode` - The operating mode
    /// * `cap_override` - Replaces the mode's default page cap (also caps full-historical runs)
    pub fn for_mode(mode: Mode, cap_override: Option<u32>) -> Self {
        match mode {
            Mode::Incremental => Self {
                mode,
                page_cap: Some(cap_override.unwrap_or(INCREMENTAL_PAGE_CAP)),
                early_stop_after: Some(INCREMENTAL_EARLY_STOP),
                checkpoint_every: 1,
            },
            Mode::BoundedHistorical => Self {
                mode,
                page_cap: Some(cap_override.unwrap_or(BOUNDED_PAGE_CAP)),
                early_stop_after: None,
                checkpoint_every: 5,
            },
            Mode::FullHistorical => Self {
                mode,
                page_cap: cap_override,
                early_stop_after: None,
                checkpoint_every: 10,
            },
        }
    }

    /// Decides whether the run continues after a processed page
    ///
    /// Checks run in a fixed order: caught up, then end of pagination, then
    /// the page cap.
    pub fn decide(&self, progress: &Progress, next: &NextPage) -> Decision {
        if let Some(limit) = self.early_stop_after {
            if progress.zero_new_streak >= limit {
                return Decision::Stop(StopReason::CaughtUp);
            }
        }

        let url = match next {
            NextPage::End(end) => return Decision::Stop(StopReason::NoNextPage(*end)),
            NextPage::Continue(url) => url,
        };

        if let Some(cap) = self.page_cap {
            if progress.pages_visited >= cap {
                return Decision::Stop(StopReason::PageLimitReached);
            }
        }

        Decision::Continue(url.clone())
    }

    /// Returns true if the run record should be checkpointed now
    pub fn should_checkpoint(&self, pages_visited: u32) -> bool {
        self.checkpoint_every > 0 && pages_visited % self.checkpoint_every == 0
    }
}

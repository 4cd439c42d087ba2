/// Traversal phase definitions
///
/// A run moves Start -> FetchPage -> ProcessPage -> Decide and then either
/// loops back to FetchPage or ends in Stopped.
use super::StopReason;
use std::fmt;

/// Represents the current phase of a traversal run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalPhase {
    /// Counters are zeroed and the newest page is the first target
    Start,

    /// A page request is in flight (including delays and retries)
    FetchPage,

    /// Items on the fetched page are being extracted, dated and accepted
    ProcessPage,

    /// The mode policy is deciding whether to continue
    Decide,

    /// Terminal: the run record has been or is being finalized
    Stopped(StopReason),
}

impl TraversalPhase {
    /// Returns true if this is the terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &TraversalPhase) -> bool {
        match (self, next) {
            (Self::Stopped(_), _) => false,
            // Cancellation and fatal errors may end a run from any live phase
            (_, Self::Stopped(_)) => true,
            (Self::Start, Self::FetchPage) => true,
            (Self::FetchPage, Self::ProcessPage) => true,
            (Self::ProcessPage, Self::Decide) => true,
            (Self::Decide, Self::FetchPage) => true,
            _ => false,
        }
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchPage => "fetch_page",
            Self::ProcessPage => "process_page",
            Self::Decide => "decide",
            Self::Stopped(_) => "stopped",
        }
    }
}

impl fmt::Display for TraversalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped(reason) => write!(f, "stopped({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

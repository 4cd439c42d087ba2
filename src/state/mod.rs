//! State module for tracking traversal progress
//!
//! This module provides the state machine a single traversal run moves
//! through and the terminal classification recorded when it ends.
//!
//! # Components
//!
//! - `TraversalPhase`: Where a run currently is (start, fetch, process, decide, stopped)
//! - `StopReason`: Why a run ended, persisted with the run record
//! - `PaginationEnd`: Which pagination condition produced `no_next_page`

mod phase;
mod stop_reason;

// Re-export main types
pub use phase::TraversalPhase;
pub use stop_reason::{PaginationEnd, StopReason};

//! Crawler module for traversing a source's page chain
//!
//! This module contains the traversal engine, including:
//! - HTTP fetching with delay, retry and robots.txt enforcement
//! - Listing page parsing into raw items and the older-page link
//! - Operating modes and their stopping policies
//! - The per-source advisory run lock
//! - Overall traversal coordination

mod coordinator;
mod fetcher;
mod lock;
mod parser;
mod policy;

pub use coordinator::{ReResolveSummary, Traversal, MATCH_ALL};
pub use fetcher::{build_http_client, parse_retry_after, FetchOutcome, FetchedPage, Fetcher};
pub use lock::SourceLock;
pub use parser::{
    extract_content, extract_page, resolve_next_page, ExtractedPage, NextPage, PageContext,
    RawItem,
};
pub use policy::{Decision, Mode, ModePolicy, Progress};

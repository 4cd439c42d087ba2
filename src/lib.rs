//! Sumi-Chronicle: a chronological archiver for paginated sources
//!
//! This crate walks a source's "older posts" chain from its newest page,
//! resolves a best-effort publication date for every item it finds, and
//! archives each item exactly once across every run it ever performs.

pub mod config;
pub mod crawler;
pub mod dates;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Sumi-Chronicle operations
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transient fetch failure for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("Rate limited by {url} (retry after {retry_after:?})")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Fetch failed for {url}: {reason}")]
    FatalFetch { url: String, reason: String },

    #[error("Crawling disallowed by robots.txt: {url}")]
    PermissionDenied { url: String },

    #[error("Malformed item on {page_url}: {message}")]
    ExtractionAnomaly { page_url: String, message: String },

    #[error("Identity conflict for {url}: stored as {existing_url} with hash {identity_hash}")]
    IdentityConflict {
        url: String,
        existing_url: String,
        identity_hash: String,
    },

    #[error("Traversal cancelled")]
    Cancelled,

    #[error("Source {source_url} is locked by another run ({lock_path})")]
    SourceLocked {
        source_url: String,
        lock_path: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Chronicle operations
pub type Result<T> = std::result::Result<T, ChronicleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Mode, ModePolicy, Traversal};
pub use dates::{Confidence, DateStrategy, ResolvedDate};
pub use state::{PaginationEnd, StopReason, TraversalPhase};
pub use storage::{AcceptOutcome, ArchivedItem, RunSummary};
pub use url::{canonicalize_url, identity_hash};

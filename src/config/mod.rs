//! Configuration module for Sumi-Chronicle
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_chronicle::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("chronicle.toml")).unwrap();
//! println!("Archiving from: {}", config.source.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, OutputConfig, SourceConfig, TraversalConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::parse_earliest_date;

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_chronicle::config::load_config;
///
/// let config = load_config(Path::new("chronicle.toml")).unwrap();
/// println!("Mode: {}", config.traversal.mode);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Parses and validates configuration text
///
/// # Arguments
///
/// * `content` - TOML document
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with each traversal run so configuration drift between runs is visible.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(digest(&std::fs::read_to_string(path)?))
}

fn digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a configuration and returns both the config and its hash
///
/// The file is read once, so the hash always describes the text that was parsed.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, digest(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::Mode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[source]
base-url = "https://example.blogspot.com/"
earliest-date = "2008-01-01"
keywords = ["quran", "hadith"]

[traversal]
mode = "bounded-historical"
page-delay-secs = 1.5
page-cap = 20

[user-agent]
crawler-name = "TestChronicle"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
json-lines-path = "./accepted.jsonl"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.source.base_url, "https://example.blogspot.com/");
        assert_eq!(config.source.keywords, vec!["quran", "hadith"]);
        assert_eq!(config.traversal.mode, Mode::BoundedHistorical);
        assert_eq!(config.traversal.page_cap, Some(20));
        assert_eq!(config.traversal.page_delay_secs, 1.5);
        assert_eq!(config.user_agent.crawler_name, "TestChronicle");
        assert_eq!(
            config.output.json_lines_path.as_deref(),
            Some("./accepted.jsonl")
        );
    }

    #[test]
    fn test_traversal_section_defaults() {
        let config_content = r#"
[source]
base-url = "https://example.blogspot.com/"

[user-agent]
crawler-name = "TestChronicle"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.traversal.mode, Mode::Incremental);
        assert_eq!(config.traversal.max_attempts, 3);
        assert_eq!(config.traversal.snippet_length, 500);
        assert!(config.traversal.exclusive);
        assert!(!config.traversal.fetch_detail_pages);
        assert!(config.source.keywords.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/chronicle.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_unknown_mode() {
        let config_content = VALID_CONFIG.replace("bounded-historical", "sometimes");
        let file = create_temp_config(&config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = VALID_CONFIG.replace("page-cap = 20", "page-cap = 0");
        let file = create_temp_config(&config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_hash_matches_loaded_text() {
        let file = create_temp_config(VALID_CONFIG);
        let (_, hash) = load_config_with_hash(file.path()).unwrap();

        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_mode_change_changes_hash() {
        let bounded = create_temp_config(VALID_CONFIG);
        let full = create_temp_config(&VALID_CONFIG.replace("bounded-historical", "full-historical"));

        let (_, hash1) = load_config_with_hash(bounded.path()).unwrap();
        let (config, hash2) = load_config_with_hash(full.path()).unwrap();

        assert_eq!(config.traversal.mode, Mode::FullHistorical);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_parse_config_from_text() {
        let config = parse_config(VALID_CONFIG).unwrap();
        assert_eq!(config.source.earliest_date.as_deref(), Some("2008-01-01"));
    }
}

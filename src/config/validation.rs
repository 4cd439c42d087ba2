use crate::config::types::{Config, OutputConfig, SourceConfig, TraversalConfig, UserAgentConfig};
use crate::ConfigError;
use chrono::NaiveDate;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_traversal_config(&config.traversal)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Parses the configured earliest-possible date, if any
pub fn parse_earliest_date(source: &SourceConfig) -> Result<Option<NaiveDate>, ConfigError> {
    source
        .earliest_date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
                ConfigError::Validation(format!(
                    "earliest_date must be YYYY-MM-DD, got '{}': {}",
                    raw, e
                ))
            })
        })
        .transpose()
}

/// Validates the source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base_url '{}' must use HTTP or HTTPS",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    parse_earliest_date(config)?;

    if config.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "keywords cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// One hour, the same ceiling the fetcher applies to any raised delay
const MAX_PAGE_DELAY_SECS: f64 = 3600.0;

/// Validates traversal configuration
fn validate_traversal_config(config: &TraversalConfig) -> Result<(), ConfigError> {
    if !config.page_delay_secs.is_finite()
        || config.page_delay_secs < 0.0
        || config.page_delay_secs > MAX_PAGE_DELAY_SECS
    {
        return Err(ConfigError::Validation(format!(
            "page_delay_secs must be between 0 and {}, got {}",
            MAX_PAGE_DELAY_SECS, config.page_delay_secs
        )));
    }

    if let Some(cap) = config.page_cap {
        if cap < 1 {
            return Err(ConfigError::Validation(format!(
                "page_cap must be >= 1, got {}",
                cap
            )));
        }
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.snippet_length < 1 {
        return Err(ConfigError::Validation(
            "snippet_length must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(config.json_lines_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "json_lines_path cannot be empty when set".to_string(),
        ));
    }

    if matches!(config.export_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "export_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

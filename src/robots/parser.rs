//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.
//! Crawl-delay is parsed by hand since the matcher does not expose it.

use robotstxt::DefaultMatcher;

/// How a robots.txt policy answers permission checks
#[derive(Debug, Clone, PartialEq, Eq)]
enum Policy {
    /// No robots.txt exists for the source
    AllowAll,
    /// The policy could not be obtained; nothing may be fetched
    DenyAll,
    /// Raw robots.txt rules
    Rules(String),
}

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, providing a simplified
/// interface for checking if URLs are allowed.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    policy: Policy,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// A ParsedRobots instance that can be used to check URL permissions
    pub fn from_content(content: &str) -> Self {
        Self {
            policy: Policy::Rules(content.to_string()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when the source has no robots.txt at all (HTTP 404).
    pub fn allow_all() -> Self {
        Self {
            policy: Policy::AllowAll,
        }
    }

    /// Creates a ParsedRobots that disallows everything
    ///
    /// Used when robots.txt exists but could not be retrieved.
    pub fn deny_all() -> Self {
        Self {
            policy: Policy::DenyAll,
        }
    }

    /// Returns true if this policy was produced by a failed robots.txt fetch
    pub fn is_deny_all(&self) -> bool {
        self.policy == Policy::DenyAll
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check
    /// * `user_agent` - The crawler's product token
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match &self.policy {
            Policy::AllowAll => true,
            Policy::DenyAll => false,
            Policy::Rules(content) if content.trim().is_empty() => true,
            Policy::Rules(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The user agent string
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let Policy::Rules(content) = &self.policy else {
            return None;
        };

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut specific = None;
        let mut wildcard = None;

        for (key, value) in content.lines().filter_map(directive) {
            if key == "user-agent" {
                // Consecutive user-agent lines share one group
                if !group_open {
                    group.clear();
                    group_open = true;
                }
                group.push(value.to_lowercase());
                continue;
            }
            group_open = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }
            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific.get_or_insert(delay);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard.get_or_insert(delay);
            }
        }

        specific.or(wildcard)
    }
}

/// Splits a robots.txt line into a lowercased key and its value
fn directive(line: &str) -> Option<(String, &str)> {
    let line = line.split('#').next()?.trim();
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_lowercase(), value.trim()))
}

//! Robots.txt handling module
//!
//! This module provides functionality for fetching and parsing the source's
//! robots.txt. The policy is fetched once per traversal run and cached by the
//! fetcher for the rest of that run.

mod parser;

pub use parser::ParsedRobots;

use crate::url::robots_url;
use reqwest::{Client, StatusCode};
use url::Url;

/// Fetches robots.txt for the origin of `source_url`
///
/// The policy fails closed: a missing file (HTTP 404) means the source set no
/// rules and everything is allowed, but any other failure to read it (network
/// error, 5xx, other 4xx) yields [`ParsedRobots::deny_all`].
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `source_url` - Any URL on the source; only its origin is used
///
/// # Returns
///
/// The parsed policy to apply for the rest of the run
pub async fn fetch_robots(client: &Client, source_url: &Url) -> ParsedRobots {
    let Some(robots_url) = robots_url(source_url) else {
        tracing::warn!("Cannot derive robots.txt location from {}", source_url);
        return ParsedRobots::deny_all();
    };

    tracing::debug!("Fetching robots.txt: {}", robots_url);

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                "Failed to fetch {}: {}; treating source as disallowed",
                robots_url,
                e
            );
            return ParsedRobots::deny_all();
        }
    };

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        tracing::debug!("No robots.txt at {}; all paths allowed", robots_url);
        return ParsedRobots::allow_all();
    }

    if !status.is_success() {
        tracing::warn!(
            "robots.txt at {} returned HTTP {}; treating source as disallowed",
            robots_url,
            status.as_u16()
        );
        return ParsedRobots::deny_all();
    }

    match response.text().await {
        Ok(body) => ParsedRobots::from_content(&body),
        Err(e) => {
            tracing::warn!(
                "Failed to read {}: {}; treating source as disallowed",
                robots_url,
                e
            );
            ParsedRobots::deny_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn robots_for(status: u16, body: &str) -> ParsedRobots {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;

        let source = Url::parse(&format!("{}/", server.uri())).unwrap();
        fetch_robots(&Client::new(), &source).await
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let robots = robots_for(404, "").await;
        assert!(!robots.is_deny_all());
        assert!(robots.is_allowed("http://127.0.0.1/anything", "TestBot"));
    }

    #[tokio::test]
    async fn test_server_error_fails_closed() {
        let robots = robots_for(503, "").await;
        assert!(robots.is_deny_all());
    }

    #[tokio::test]
    async fn test_forbidden_fails_closed() {
        let robots = robots_for(403, "").await;
        assert!(robots.is_deny_all());
    }

    #[tokio::test]
    async fn test_rules_are_parsed() {
        let robots = robots_for(200, "User-agent: *\nDisallow: /private").await;
        assert!(robots.is_allowed("http://127.0.0.1/2015/03/post.html", "TestBot"));
        assert!(!robots.is_allowed("http://127.0.0.1/private/page", "TestBot"));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_closed() {
        // Port 9 (discard) on localhost is not expected to be listening
        let source = Url::parse("http://127.0.0.1:9/").unwrap();
        let robots = fetch_robots(&Client::new(), &source).await;
        assert!(robots.is_deny_all());
    }
}

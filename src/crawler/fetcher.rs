//! HTTP fetcher implementation
//!
//! This module handles every request a traversal makes, including:
//! - Building the HTTP client with the declared client identifier
//! - The minimum delay between the end of one request and the start of the next
//! - Classifying each response as ok, retryable, rate-limited or fatal
//! - Bounded retries with linear backoff, and delay escalation on HTTP 429
//! - The source's robots.txt policy, fetched once per run
//!
//! Every wait is raced against the run's cancellation signal. A fetcher
//! belongs to exactly one traversal; nothing here is shared between runs.

use crate::config::{Config, UserAgentConfig};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::{ChronicleError, ConfigError};
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, redirect::Policy, Client, Response, StatusCode};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use url::Url;

/// Upper bound on a server-requested Retry-After delay
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Ceiling of the delay between requests, however it was raised
pub const MAX_DELAY: Duration = MAX_RETRY_AFTER;

/// Floor of the backoff unit and of an escalated delay
const MIN_BACKOFF: Duration = Duration::from_secs(1);

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was requested
    pub url: Url,

    /// The URL after redirects
    pub final_url: Url,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Classified result of a single request
#[derive(Debug)]
pub enum FetchOutcome {
    Ok(FetchedPage),

    /// Timeout, 5xx, dropped connection
    Retryable(String),

    /// HTTP 429, with the server's Retry-After hint when it sent one
    RateLimited(Option<Duration>),

    /// Any other 4xx, malformed request, redirect loop
    Fatal(String),
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_chronicle::config::UserAgentConfig;
/// use sumi_chronicle::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiChronicle".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses a Retry-After header value (delta seconds or HTTP-date)
///
/// Values are capped at [`MAX_RETRY_AFTER`]; a date in the past means no wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    let at = httpdate::parse_http_date(value).ok()?;
    let delay = at
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(delay.min(MAX_RETRY_AFTER))
}

/// Rate-limited, retrying, robots-aware fetcher of one traversal
pub struct Fetcher {
    client: Client,

    /// Product token matched against robots.txt groups
    agent: String,
    robots: ParsedRobots,

    /// Configured delay; the backoff unit
    base_delay: Duration,

    /// Current delay; only ever raised during a run
    delay: Duration,
    max_attempts: u32,
    last_request_end: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

impl Fetcher {
    /// Creates a fetcher for one run
    ///
    /// The robots policy starts out as deny-all until [`Fetcher::load_robots`]
    /// has been called.
    pub fn new(config: &Config, cancel: watch::Receiver<bool>) -> Result<Self, ChronicleError> {
        let traversal = &config.traversal;
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(traversal.request_timeout_secs),
        )?;
        let base_delay = Duration::try_from_secs_f64(traversal.page_delay_secs)
            .ok()
            .filter(|delay| *delay <= MAX_DELAY)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "page-delay-secs must be between 0 and {}, got {}",
                    MAX_DELAY.as_secs(),
                    traversal.page_delay_secs
                ))
            })?;

        Ok(Self {
            client,
            agent: config.user_agent.crawler_name.clone(),
            robots: ParsedRobots::deny_all(),
            base_delay,
            delay: base_delay,
            max_attempts: traversal.max_attempts.max(1),
            last_request_end: None,
            cancel,
        })
    }

    /// Fetches and caches the source's robots.txt for the rest of the run
    ///
    /// A crawl-delay longer than the configured delay raises it.
    pub async fn load_robots(&mut self, source_url: &Url) {
        self.robots = fetch_robots(&self.client, source_url).await;
        self.last_request_end = Some(Instant::now());

        if let Some(secs) = self.robots.crawl_delay(&self.agent) {
            let crawl_delay = Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_DELAY)
                .min(MAX_DELAY);
            if crawl_delay > self.delay {
                tracing::info!(
                    "robots.txt crawl-delay {:.1}s exceeds configured delay; using {:?}",
                    secs,
                    crawl_delay
                );
                self.delay = crawl_delay;
            }
        }
    }

    /// Returns true if the cached policy allows fetching `url`
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.robots.is_allowed(url.as_str(), &self.agent)
    }

    /// The delay currently enforced between requests
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Returns true once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fetches a URL, retrying retryable and rate-limited outcomes
    ///
    /// # Retry Logic
    ///
    /// | Outcome | Action |
    /// |---------|--------|
    /// | 2xx | Return the page |
    /// | 429 | Double the delay (or use Retry-After if larger), retry |
    /// | 5xx, 408, timeout, connection error | Linear backoff, retry |
    /// | Other 4xx, redirect loop | Fail immediately |
    ///
    /// Retries stop after the configured attempt count.
    ///
    /// # Errors
    ///
    /// - [`ChronicleError::PermissionDenied`] if robots.txt disallows the URL
    /// - [`ChronicleError::TransientFetch`] / [`ChronicleError::RateLimited`] once attempts run out
    /// - [`ChronicleError::FatalFetch`] for non-retryable failures
    /// - [`ChronicleError::Cancelled`] if cancellation arrives during a wait
    pub async fn fetch(&mut self, url: &Url) -> Result<FetchedPage, ChronicleError> {
        if !self.is_allowed(url) {
            return Err(ChronicleError::PermissionDenied {
                url: url.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.wait_for_turn().await?;

            tracing::debug!("GET {} (attempt {}/{})", url, attempt, self.max_attempts);
            let outcome = self.attempt(url).await;
            self.last_request_end = Some(Instant::now());

            match outcome {
                FetchOutcome::Ok(page) => return Ok(page),
                FetchOutcome::Fatal(reason) => {
                    return Err(ChronicleError::FatalFetch {
                        url: url.to_string(),
                        reason,
                    })
                }
                FetchOutcome::Retryable(reason) => {
                    if attempt >= self.max_attempts {
                        return Err(ChronicleError::TransientFetch {
                            url: url.to_string(),
                            reason,
                        });
                    }
                    let backoff = self
                        .base_delay
                        .max(MIN_BACKOFF)
                        .checked_mul(attempt)
                        .map_or(MAX_DELAY, |b| b.min(MAX_DELAY));
                    tracing::warn!(
                        "Retryable failure for {}: {}; retrying in {:?}",
                        url,
                        reason,
                        backoff
                    );
                    self.sleep(backoff).await?;
                }
                FetchOutcome::RateLimited(retry_after) => {
                    self.delay = escalate(self.delay, retry_after);
                    if attempt >= self.max_attempts {
                        return Err(ChronicleError::RateLimited {
                            url: url.to_string(),
                            retry_after,
                        });
                    }
                    tracing::warn!(
                        "Rate limited by {}; delay raised to {:?}",
                        url,
                        self.delay
                    );
                }
            }
        }
    }

    /// Sends one request and classifies the result
    async fn attempt(&self, url: &Url) -> FetchOutcome {
        match self.client.get(url.clone()).send().await {
            Ok(response) => classify_response(url, response).await,
            Err(e) if e.is_redirect() || e.is_builder() => FetchOutcome::Fatal(e.to_string()),
            Err(e) if e.is_timeout() => FetchOutcome::Retryable("request timeout".to_string()),
            Err(e) => FetchOutcome::Retryable(e.to_string()),
        }
    }

    /// Waits until the current delay has passed since the previous request
    async fn wait_for_turn(&mut self) -> Result<(), ChronicleError> {
        let remaining = match self.last_request_end {
            Some(end) => self.delay.saturating_sub(end.elapsed()),
            None => Duration::ZERO,
        };
        self.sleep(remaining).await
    }

    /// Sleeps unless cancellation arrives first
    async fn sleep(&mut self, duration: Duration) -> Result<(), ChronicleError> {
        if self.is_cancelled() {
            return Err(ChronicleError::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            Ok(_) = self.cancel.wait_for(|cancelled| *cancelled) => Err(ChronicleError::Cancelled),
        }
    }
}

/// The delay after a 429: doubled, or the server's hint if larger, at most [`MAX_DELAY`]
fn escalate(delay: Duration, retry_after: Option<Duration>) -> Duration {
    let doubled = delay.checked_mul(2).unwrap_or(MAX_DELAY).max(MIN_BACKOFF);
    doubled
        .max(retry_after.unwrap_or(Duration::ZERO))
        .min(MAX_DELAY)
}

async fn classify_response(url: &Url, response: Response) -> FetchOutcome {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return FetchOutcome::RateLimited(retry_after);
    }

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return FetchOutcome::Retryable(format!("HTTP {}", status.as_u16()));
    }

    if !status.is_success() {
        return FetchOutcome::Fatal(format!("HTTP {}", status.as_u16()));
    }

    let final_url = response.url().clone();
    match response.text().await {
        Ok(body) => FetchOutcome::Ok(FetchedPage {
            url: url.clone(),
            final_url,
            body,
            fetched_at: Utc::now(),
        }),
        Err(e) => FetchOutcome::Retryable(format!("failed to read body: {}", e)),
    }
}

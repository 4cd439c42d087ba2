//! Traversal coordinator - the per-run state machine
//!
//! This module drives one run page by page:
//! - Fetching the newest page and following the older-page chain
//! - Extracting items, applying the inclusion rule and resolving dates
//! - Offering candidates to the identity store and fanning acceptances out to sinks
//! - Consulting the mode policy after every page and checkpointing progress
//! - Finalizing the run record however the run ends
//!
//! Pages are strictly sequential: page N's URL is only known after page N-1
//! has been parsed. The only suspension points are the fetcher's delays and
//! backoffs, and both observe cancellation.

use crate::config::{parse_earliest_date, Config};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::lock::SourceLock;
use crate::crawler::parser::{extract_content, extract_page, resolve_next_page, PageContext, RawItem};
use crate::crawler::policy::{Decision, ModePolicy, Progress};
use crate::dates::{DateEvidence, DateResolver};
use crate::output::ArchiveSink;
use crate::state::{StopReason, TraversalPhase};
use crate::storage::{AcceptOutcome, NewItem, RunCounters, RunSummary, Storage, StorageError};
use crate::url::{canonicalize_url, identity_hash};
use crate::ChronicleError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::watch;
use url::Url;

/// Rationale recorded when no keywords are configured
pub const MATCH_ALL: &str = "all";

/// Mutable state of one run, owned by the traversal for its duration
#[derive(Debug)]
struct RunState {
    run_id: i64,
    phase: TraversalPhase,
    counters: RunCounters,
    progress: Progress,

    /// Canonical forms of every page fetched in this run
    visited: HashSet<String>,
}

impl RunState {
    fn enter(&mut self, next: TraversalPhase) {
        debug_assert!(
            self.phase.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        tracing::trace!("Run {}: {} -> {}", self.run_id, self.phase, next);
        self.phase = next;
    }
}

/// What happened to one item on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Accepted,
    Duplicate,
    Filtered,
}

/// Outcome of `--re-resolve`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReResolveSummary {
    /// Items with low or unknown confidence that were looked at
    pub examined: u32,

    /// Items whose date was replaced by a more confident one
    pub improved: u32,

    /// Items whose page could not be fetched
    pub failed: u32,
}

/// One traversal of one source
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_chronicle::config::load_config;
/// use sumi_chronicle::crawler::Traversal;
/// use sumi_chronicle::output::configured_sinks;
/// use sumi_chronicle::storage::open_storage;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("chronicle.toml"))?;
/// let storage = open_storage(Path::new(&config.output.database_path))?;
/// let sinks = configured_sinks(&config)?;
/// let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
///
/// let mut traversal = Traversal::new(config, storage, sinks, cancel_rx)?;
/// let summary = traversal.run().await?;
/// println!("{} new items, stopped: {}", summary.items_accepted, summary.stop_reason);
/// # Ok(())
/// # }
/// ```
pub struct Traversal<S: Storage> {
    config: Config,
    config_hash: String,
    source_url: Url,
    policy: ModePolicy,
    resolver: DateResolver,

    /// Lowercased inclusion keywords paired with their configured spelling
    keywords: Vec<(String, String)>,
    storage: S,
    sinks: Vec<Box<dyn ArchiveSink>>,
    cancel: watch::Receiver<bool>,
}

impl<S: Storage> Traversal<S> {
    /// Creates a traversal
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration, including any CLI overrides
    /// * `storage` - The identity store
    /// * `sinks` - Consumers of acceptance events
    /// * `cancel` - Flips to `true` when the run should stop
    ///
    /// # Returns
    ///
    /// * `Ok(Traversal)` - Ready to run
    /// * `Err(ChronicleError)` - The source URL or earliest date is invalid
    pub fn new(
        config: Config,
        storage: S,
        sinks: Vec<Box<dyn ArchiveSink>>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Self, ChronicleError> {
        let source_url = Url::parse(&config.source.base_url)?;
        let earliest = parse_earliest_date(&config.source)?;
        let policy = ModePolicy::for_mode(config.traversal.mode, config.traversal.page_cap);
        let keywords = config
            .source
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| (k.trim().to_lowercase(), k.trim().to_string()))
            .collect();

        Ok(Self {
            config,
            config_hash: String::new(),
            source_url,
            policy,
            resolver: DateResolver::new(earliest),
            keywords,
            storage,
            sinks,
            cancel,
        })
    }

    /// Records the configuration digest in every run this traversal starts
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Runs one traversal from the newest page until the policy stops it
    ///
    /// The run record is finalized however the run ends. Fetch failures,
    /// robots denials and cancellation end the run with a summary
    /// (`fetch_error` / `cancelled`) rather than an error, so partial
    /// progress is always reported.
    ///
    /// # Errors
    ///
    /// - [`ChronicleError::SourceLocked`] if another run holds the source
    /// - [`ChronicleError::IdentityConflict`] and storage failures, after the
    ///   run has been finalized as `fatal`
    pub async fn run(&mut self) -> Result<RunSummary, ChronicleError> {
        let _lock = self.acquire_lock()?;
        let source = self.config.source.base_url.clone();
        let mode = self.policy.mode;

        // Seed before this run's own record exists
        let seed = if self.policy.early_stop_after.is_some() {
            match self.storage.latest_finished_run(&source)? {
                Some(last) if last.stop_reason.is_some_and(|r| r.archive_complete()) => {
                    tracing::debug!(
                        "Run {} left the archive complete; starting with a zero-new streak of 1",
                        last.id
                    );
                    1
                }
                _ => 0,
            }
        } else {
            0
        };

        let started_at = Utc::now();
        let run_id = self.storage.begin_run(&source, mode, &self.config_hash)?;
        tracing::info!(
            "Run {} started: {} mode from {} (page cap: {})",
            run_id,
            mode,
            source,
            self.policy
                .page_cap
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let mut state = RunState {
            run_id,
            phase: TraversalPhase::Start,
            counters: RunCounters::default(),
            progress: Progress::seeded(seed),
            visited: HashSet::new(),
        };

        let outcome = match Fetcher::new(&self.config, self.cancel.clone()) {
            Ok(mut fetcher) => {
                fetcher.load_robots(&self.source_url).await;
                self.traverse(&mut fetcher, &mut state).await
            }
            Err(e) => Err(e),
        };

        let (stop_reason, error) = match outcome {
            Ok(reason) => (reason, None),
            Err(ChronicleError::Cancelled) => (StopReason::Cancelled, None),
            Err(
                e @ (ChronicleError::PermissionDenied { .. }
                | ChronicleError::TransientFetch { .. }
                | ChronicleError::RateLimited { .. }
                | ChronicleError::FatalFetch { .. }),
            ) => (StopReason::FetchError, Some(e)),
            Err(e) => (StopReason::Fatal, Some(e)),
        };

        state.enter(TraversalPhase::Stopped(stop_reason));
        self.storage.finish_run(run_id, &state.counters, stop_reason)?;

        let summary = RunSummary::new(
            run_id,
            mode,
            started_at,
            Utc::now(),
            state.counters,
            stop_reason,
        )
        .with_failure(error.as_ref().map(|e| e.to_string()));

        match &error {
            Some(e) => tracing::error!(
                "Run {} aborted after {} pages and {} new items: {}",
                run_id,
                summary.pages_visited,
                summary.items_accepted,
                e
            ),
            None => tracing::info!(
                "Run {} stopped: {} ({} pages, {} new items)",
                run_id,
                stop_reason,
                summary.pages_visited,
                summary.items_accepted
            ),
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.on_run_finished(&summary) {
                tracing::warn!("Sink {} failed on run summary: {}", sink.name(), e);
            }
        }

        match error {
            Some(e) if stop_reason == StopReason::Fatal => Err(e),
            _ => Ok(summary),
        }
    }

    /// Re-resolves dates of archived items with low or unknown confidence
    ///
    /// Each item's own page is fetched (through the same polite fetcher) and
    /// the cascade runs again. Only a strictly more confident result replaces
    /// the stored date fields; identity fields never change.
    pub async fn re_resolve(&mut self) -> Result<ReResolveSummary, ChronicleError> {
        let _lock = self.acquire_lock()?;
        let candidates = self.storage.items_for_re_resolve()?;
        tracing::info!("Re-resolving dates of {} items", candidates.len());

        let mut fetcher = Fetcher::new(&self.config, self.cancel.clone())?;
        fetcher.load_robots(&self.source_url).await;

        let mut summary = ReResolveSummary::default();
        for item in candidates {
            if fetcher.is_cancelled() {
                tracing::info!("Re-resolve cancelled");
                break;
            }
            summary.examined += 1;

            let (url, canonical) = match (
                Url::parse(&item.link_url),
                Url::parse(&item.canonical_url),
            ) {
                (Ok(link), Ok(canonical)) => (link, canonical),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Stored URL of {} is invalid: {}", item.canonical_url, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let page = match fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(ChronicleError::Cancelled) => break,
                Err(e) => {
                    tracing::warn!("Could not re-fetch {}: {}", url, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let raw = RawItem {
                source_url: canonical,
                link: url,
                title: item.title.clone(),
                snippet: item.snippet.clone(),
                context: PageContext {
                    fragment_html: String::new(),
                    position: 0,
                    window_date: None,
                },
            };
            let evidence =
                DateEvidence::listing(&raw, page.fetched_at).with_detail(Some(&page.body));
            let resolved = self.resolver.resolve(&evidence);

            if resolved.confidence > item.date_confidence {
                tracing::info!(
                    "Improved date of {}: {} -> {} ({})",
                    item.canonical_url,
                    item.date_confidence,
                    resolved.confidence,
                    resolved.strategy
                );
                self.storage.refresh_date(&item.identity_hash, &resolved)?;
                summary.improved += 1;
            }
        }

        tracing::info!(
            "Re-resolve finished: {} examined, {} improved, {} failed",
            summary.examined,
            summary.improved,
            summary.failed
        );
        Ok(summary)
    }

    fn acquire_lock(&self) -> Result<Option<SourceLock>, ChronicleError> {
        if !self.config.traversal.exclusive {
            return Ok(None);
        }
        SourceLock::acquire(
            Path::new(&self.config.output.database_path),
            &self.config.source.base_url,
        )
        .map(Some)
    }

    /// The page loop; returns the natural stop reason or the error that ended it
    async fn traverse(
        &mut self,
        fetcher: &mut Fetcher,
        state: &mut RunState,
    ) -> Result<StopReason, ChronicleError> {
        let mut current = self.source_url.clone();

        loop {
            if fetcher.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            state.enter(TraversalPhase::FetchPage);
            let page = fetcher.fetch(&current).await?;
            for seen in [&current, &page.final_url] {
                if let Ok(canonical) = canonicalize_url(seen.as_str()) {
                    state.visited.insert(canonical.to_string());
                }
            }

            state.enter(TraversalPhase::ProcessPage);
            let extracted = extract_page(
                &page.body,
                &page.final_url,
                page.fetched_at,
                self.config.traversal.snippet_length,
            );
            state.counters.anomalies += u32::try_from(extracted.anomalies.len()).unwrap_or(u32::MAX);

            let mut page_new = 0;
            for item in &extracted.items {
                if self.process_item(fetcher, state, item, page.fetched_at).await?
                    == ItemOutcome::Accepted
                {
                    page_new += 1;
                }
            }

            state.counters.pages_visited += 1;
            state.progress.record_page(page_new);
            tracing::info!(
                "Page {} ({}): {} items, {} new, {} new in total",
                state.counters.pages_visited,
                current,
                extracted.items.len(),
                page_new,
                state.progress.total_new
            );

            if self.policy.should_checkpoint(state.counters.pages_visited) {
                self.storage.checkpoint_run(state.run_id, &state.counters)?;
                tracing::info!(
                    "Checkpoint: run {} at {} pages, {} accepted",
                    state.run_id,
                    state.counters.pages_visited,
                    state.counters.items_accepted
                );
            }

            state.enter(TraversalPhase::Decide);
            let next = resolve_next_page(extracted.next_page, &current, &state.visited);
            match self.policy.decide(&state.progress, &next) {
                Decision::Continue(url) => current = url,
                Decision::Stop(reason) => return Ok(reason),
            }
        }
    }

    /// Filters, dates and offers one item to the store
    ///
    /// Item-level problems are counted and logged, never returned. Only
    /// cancellation, identity conflicts and storage failures escape.
    async fn process_item(
        &mut self,
        fetcher: &mut Fetcher,
        state: &mut RunState,
        item: &RawItem,
        fetched_at: DateTime<Utc>,
    ) -> Result<ItemOutcome, ChronicleError> {
        state.counters.items_seen += 1;

        let Some(match_rationale) = self.inclusion(item) else {
            tracing::trace!("Filtered: {}", item.source_url);
            state.counters.items_filtered += 1;
            return Ok(ItemOutcome::Filtered);
        };

        // Known items cost nothing: no detail fetch, no resolution
        if self.storage.contains(&identity_hash(&item.source_url))? {
            state.counters.items_duplicate += 1;
            return Ok(ItemOutcome::Duplicate);
        }

        let detail = if self.config.traversal.fetch_detail_pages {
            match fetcher.fetch(&item.link).await {
                Ok(page) => Some(page),
                Err(ChronicleError::Cancelled) => return Err(ChronicleError::Cancelled),
                Err(e) => {
                    let anomaly = ChronicleError::ExtractionAnomaly {
                        page_url: item.link.to_string(),
                        message: e.to_string(),
                    };
                    tracing::warn!("{}; using listing evidence only", anomaly);
                    state.counters.anomalies += 1;
                    None
                }
            }
        } else {
            None
        };

        let detail_html = detail.as_ref().map(|page| page.body.as_str());
        let evidence = DateEvidence::listing(item, fetched_at).with_detail(detail_html);
        let resolved = self.resolver.resolve(&evidence);

        let new_item = NewItem {
            canonical_url: item.source_url.clone(),
            link_url: item.link.clone(),
            title: item.title.clone(),
            snippet: item.snippet.clone(),
            content: detail_html.and_then(extract_content),
            resolved,
            match_rationale,
            first_seen_run: Some(state.run_id),
        };

        match self.storage.try_accept(&new_item) {
            Ok(AcceptOutcome::Accepted(archived)) => {
                state.counters.items_accepted += 1;
                if archived.needs_review {
                    state.counters.review_flagged += 1;
                }
                for sink in &mut self.sinks {
                    if let Err(e) = sink.on_accepted(&archived) {
                        tracing::warn!(
                            "Sink {} failed on {}: {}",
                            sink.name(),
                            archived.canonical_url,
                            e
                        );
                    }
                }
                Ok(ItemOutcome::Accepted)
            }
            Ok(AcceptOutcome::Duplicate) => {
                state.counters.items_duplicate += 1;
                Ok(ItemOutcome::Duplicate)
            }
            Err(StorageError::IdentityConflict {
                url,
                existing_url,
                identity_hash,
            }) => {
                tracing::error!(
                    "Identity conflict: {} collides with stored {} ({})",
                    url,
                    existing_url,
                    identity_hash
                );
                Err(ChronicleError::IdentityConflict {
                    url,
                    existing_url,
                    identity_hash,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies the inclusion rule, returning the match rationale
    ///
    /// With no keywords every item is included (`all`); otherwise the first
    /// keyword found case-insensitively in the title or snippet wins
    /// (`keyword:<kw>`).
    fn inclusion(&self, item: &RawItem) -> Option<String> {
        if self.keywords.is_empty() {
            return Some(MATCH_ALL.to_string());
        }

        let haystack = format!("{} {}", item.title, item.snippet).to_lowercase();
        self.keywords
            .iter()
            .find(|(needle, _)| haystack.contains(needle.as_str()))
            .map(|(_, keyword)| format!("keyword:{}", keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, SourceConfig, TraversalConfig, UserAgentConfig};
    use crate::crawler::Mode;
    use crate::storage::SqliteStorage;

    fn config(keywords: &[&str]) -> Config {
        Config {
            source: SourceConfig {
                base_url: "https://example.com/".to_string(),
                earliest_date: Some("2008-01-01".to_string()),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            },
            traversal: TraversalConfig {
                mode: Mode::BoundedHistorical,
                page_cap: Some(3),
                exclusive: false,
                ..Default::default()
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            output: OutputConfig {
                database_path: ":memory:".to_string(),
                json_lines_path: None,
                export_path: None,
            },
        }
    }

    fn traversal(keywords: &[&str]) -> Traversal<SqliteStorage> {
        let (_tx, rx) = watch::channel(false);
        Traversal::new(
            config(keywords),
            SqliteStorage::new_in_memory().unwrap(),
            vec![],
            rx,
        )
        .unwrap()
    }

    fn raw(title: &str, snippet: &str) -> RawItem {
        RawItem {
            source_url: Url::parse("https://example.com/2015/03/a.html").unwrap(),
            link: Url::parse("https://example.com/2015/03/a.html").unwrap(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            context: PageContext {
                fragment_html: String::new(),
                position: 0,
                window_date: None,
            },
        }
    }

    #[test]
    fn test_inclusion_without_keywords_accepts_all() {
        let t = traversal(&[]);
        assert_eq!(t.inclusion(&raw("Anything", "")), Some("all".to_string()));
    }

    #[test]
    fn test_inclusion_first_keyword_wins() {
        let t = traversal(&["Hadith", "quran"]);
        assert_eq!(
            t.inclusion(&raw("Reading the QURAN", "with a hadith commentary")),
            Some("keyword:Hadith".to_string())
        );
        assert_eq!(
            t.inclusion(&raw("Notes", "on the quran")),
            Some("keyword:quran".to_string())
        );
        assert_eq!(t.inclusion(&raw("Weather", "sunny")), None);
    }

    #[test]
    fn test_policy_follows_config() {
        let t = traversal(&[]);
        assert_eq!(t.policy().mode, Mode::BoundedHistorical);
        assert_eq!(t.policy().page_cap, Some(3));
    }

    #[test]
    fn test_invalid_source_url_is_rejected() {
        let mut cfg = config(&[]);
        cfg.source.base_url = "not a url".to_string();
        let (_tx, rx) = watch::channel(false);
        let result = Traversal::new(cfg, SqliteStorage::new_in_memory().unwrap(), vec![], rx);
        assert!(result.is_err());
    }

    #[test]
    fn test_phase_guard_accepts_happy_path() {
        let mut state = RunState {
            run_id: 1,
            phase: TraversalPhase::Start,
            counters: RunCounters::default(),
            progress: Progress::default(),
            visited: HashSet::new(),
        };
        state.enter(TraversalPhase::FetchPage);
        state.enter(TraversalPhase::ProcessPage);
        state.enter(TraversalPhase::Decide);
        state.enter(TraversalPhase::FetchPage);
        state.enter(TraversalPhase::Stopped(StopReason::Cancelled));
        assert!(state.phase.is_terminal());
    }
}

//! Crawl scheduler
//!
//! A single loop owns the frontier receiver, the duplicate filter and the
//! counters. It waits on three things at once:
//! - a link arriving on the frontier
//! - a fetch task finishing
//! - the idle deadline passing
//!
//! When no link has arrived for `idle_timeout` the frontier is closed. The
//! loop then drains what was already queued, waits for every outstanding
//! task, and returns.

use crate::crawler::fetch::{fetch_page, FetchContext, FetchOutcome};
use crate::crawler::frontier::{Frontier, FRONTIER_CAPACITY};
use crate::crawler::{CrawlStats, Link, Processor, UserAgentPolicy};
use crate::filter::DuplicateFilter;
use crate::network::HttpEngine;
use crate::CrawlError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::Instrument;

/// Longest idle timeout a crawler accepts
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Crawl-level tuning
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Links the frontier can hold before producers wait
    pub frontier_capacity: usize,

    /// How long the frontier may stay quiet before it is closed
    pub idle_timeout: Duration,

    /// Pause at the end of every successful fetch task
    pub fetch_interval: Duration,

    /// User agent sent with every page request
    pub user_agent: UserAgentPolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            frontier_capacity: FRONTIER_CAPACITY,
            idle_timeout: Duration::from_secs(15),
            fetch_interval: Duration::from_millis(500),
            user_agent: UserAgentPolicy::default(),
        }
    }
}

/// Lifecycle of a crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    /// Built, not started yet
    Ready,
    /// Accepting and dispatching links
    Running,
    /// Frontier closed, waiting for outstanding tasks
    Draining,
    /// All tasks joined
    Stopped,
}

/// Builder for [`Crawler`]
#[derive(Default)]
pub struct CrawlerBuilder {
    start_link: Option<String>,
    processor: Option<Arc<dyn Processor>>,
    filter: Option<Arc<dyn DuplicateFilter>>,
    engine: Option<Arc<HttpEngine>>,
    max_connections: Option<usize>,
    config: CrawlerConfig,
}

impl CrawlerBuilder {
    /// Sets the URL the crawl starts from
    pub fn start_link(mut self, url: impl Into<String>) -> Self {
        self.start_link = Some(url.into());
        self
    }

    /// Sets the processor that extracts links from fetched pages
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Sets the filter that decides which urls were already seen
    pub fn filter(mut self, filter: Arc<dyn DuplicateFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Uses an existing engine, possibly shared with other crawlers
    pub fn engine(mut self, engine: Arc<HttpEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Builds a default engine with this connection ceiling
    ///
    /// Ignored when an engine is supplied.
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Overrides the default crawl tuning
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the parts and assembles the crawler
    pub fn build(self) -> Result<Crawler, CrawlError> {
        let start_link = match self.start_link {
            Some(link) if !link.trim().is_empty() => link,
            _ => return Err(invalid("start link must be specified. Nothing to do")),
        };
        let processor = self
            .processor
            .ok_or_else(|| invalid("processor must be specified"))?;
        let filter = self
            .filter
            .ok_or_else(|| invalid("duplicate filter must be specified"))?;
        if self.config.frontier_capacity == 0 {
            return Err(invalid("frontier capacity must be at least 1"));
        }
        if self.config.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(invalid("idle timeout must not exceed 24 hours"));
        }

        let engine = match (self.engine, self.max_connections) {
            (Some(engine), _) => engine,
            (None, Some(max_connections)) => Arc::new(HttpEngine::with_params(
                max_connections,
                Duration::from_secs(crate::network::TIMEOUT_SECS),
                crate::network::RETRIES,
            )),
            (None, None) => Arc::new(HttpEngine::new()),
        };

        Ok(Crawler {
            start_link,
            processor,
            filter,
            engine,
            config: self.config,
            state: CrawlState::Ready,
            stats: CrawlStats::default(),
        })
    }
}

/// Instant `timeout` from now, saturating for durations the clock cannot represent
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + MAX_IDLE_TIMEOUT)
}

fn invalid(reason: &str) -> CrawlError {
    tracing::error!("Cannot create crawler: {}", reason);
    CrawlError::Validation(reason.to_string())
}

/// Drives a crawl from a start link until the frontier goes quiet
pub struct Crawler {
    start_link: String,
    processor: Arc<dyn Processor>,
    filter: Arc<dyn DuplicateFilter>,
    engine: Arc<HttpEngine>,
    config: CrawlerConfig,
    state: CrawlState,
    stats: CrawlStats,
}

impl Crawler {
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::default()
    }

    /// Creates a crawler with a default engine and configuration
    pub fn new(
        processor: Arc<dyn Processor>,
        filter: Arc<dyn DuplicateFilter>,
        start_link: impl Into<String>,
    ) -> Result<Self, CrawlError> {
        Self::builder()
            .processor(processor)
            .filter(filter)
            .start_link(start_link)
            .build()
    }

    /// Creates a crawler whose default engine allows `max_connections` requests at once
    pub fn with_max_connections(
        max_connections: usize,
        processor: Arc<dyn Processor>,
        filter: Arc<dyn DuplicateFilter>,
        start_link: impl Into<String>,
    ) -> Result<Self, CrawlError> {
        Self::builder()
            .max_connections(max_connections)
            .processor(processor)
            .filter(filter)
            .start_link(start_link)
            .build()
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn engine(&self) -> &Arc<HttpEngine> {
        &self.engine
    }

    /// Runs the crawl to completion and returns its statistics
    ///
    /// Returns only after every dispatched fetch task has finished. A
    /// crawler runs once; calling `start` again returns the recorded stats.
    pub async fn start(&mut self) -> CrawlStats {
        if self.state != CrawlState::Ready {
            tracing::warn!("Crawler for {} already ran ({:?})", self.start_link, self.state);
            return self.stats.clone();
        }

        let span = tracing::info_span!("crawl", start = %self.start_link);
        self.run().instrument(span).await;
        self.stats.clone()
    }

    async fn run(&mut self) {
        let started = Instant::now();
        self.stats.started_at = Some(Utc::now());
        self.state = CrawlState::Running;
        tracing::info!("Crawler started");

        let (mut frontier, sender) = Frontier::new(self.config.frontier_capacity);
        if sender.try_push(Link::new(self.start_link.clone())).is_err() {
            // A fresh frontier always has room for the seed
            tracing::error!("Could not seed frontier with {}", self.start_link);
        }

        let context = Arc::new(FetchContext {
            engine: self.engine.clone(),
            processor: self.processor.clone(),
            frontier: sender,
            user_agent: self.config.user_agent.clone(),
            fetch_interval: self.config.fetch_interval,
        });
        let idle_timeout = self.config.idle_timeout;
        let mut idle_deadline = deadline_after(idle_timeout);
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                received = frontier.recv(), if self.state == CrawlState::Running => {
                    match received {
                        Some(link) => {
                            if !frontier.is_closed() {
                                idle_deadline = deadline_after(idle_timeout);
                            }
                            self.dispatch(link, &context, &mut tasks).await;
                        }
                        None => {
                            tracing::debug!("Frontier drained, waiting for {} tasks", tasks.len());
                            self.state = CrawlState::Draining;
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.record(joined);
                }
                _ = tokio::time::sleep_until(idle_deadline), if !frontier.is_closed() => {
                    tracing::info!("No new url for {:?}, closing frontier", idle_timeout);
                    frontier.close();
                }
                else => break,
            }

            if self.state == CrawlState::Draining && tasks.is_empty() {
                break;
            }
        }

        self.state = CrawlState::Stopped;
        self.stats.elapsed = started.elapsed();
        self.stats.finished_at = Some(Utc::now());
        tracing::info!(
            "Crawler Shutdown. {} fetched, {} failed in {:?}",
            self.stats.fetched,
            self.stats.failed,
            self.stats.elapsed
        );
    }

    async fn dispatch(
        &mut self,
        link: Link,
        context: &Arc<FetchContext>,
        tasks: &mut JoinSet<FetchOutcome>,
    ) {
        if self.filter.check_duplicate(link.url()).await {
            tracing::trace!("url: {} duplicate. Skip!", link.url());
            self.stats.duplicates += 1;
            return;
        }

        tracing::debug!("Dispatching {}", link.url());
        self.stats.dispatched += 1;
        tasks.spawn(fetch_page(context.clone(), link).in_current_span());
    }

    fn record(&mut self, joined: Result<FetchOutcome, JoinError>) {
        match joined {
            Ok(FetchOutcome::Success) => self.stats.fetched += 1,
            Ok(FetchOutcome::Failure) => self.stats.failed += 1,
            Err(e) => {
                tracing::error!("Fetch task did not complete: {}", e);
                self.stats.failed += 1;
            }
        }
    }
}

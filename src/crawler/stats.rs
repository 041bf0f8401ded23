use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Counters for one crawl
///
/// Only the scheduler loop updates these; fetch tasks report their outcome
/// and never touch the counters themselves.
#[derive(Debug, Clone, Default)]
pub struct CrawlStats {
    /// Pages fetched and processed successfully
    pub fetched: u64,

    /// Pages whose fetch failed after all retries
    pub failed: u64,

    /// Fetch tasks spawned
    pub dispatched: u64,

    /// URLs skipped because the filter had already seen them
    pub duplicates: u64,

    /// When the crawl started
    pub started_at: Option<DateTime<Utc>>,

    /// When the crawl stopped
    pub finished_at: Option<DateTime<Utc>>,

    /// Wall-clock duration of the crawl
    pub elapsed: Duration,
}

impl CrawlStats {
    /// Tasks that reported back, win or lose
    pub fn completed(&self) -> u64 {
        self.fetched + self.failed
    }

    /// Average successful pages per second over the whole crawl
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.fetched as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Crawl Statistics ===")?;
        writeln!(f, "  Pages fetched: {}", self.fetched)?;
        writeln!(f, "  Pages failed: {}", self.failed)?;
        writeln!(f, "  Duplicate urls skipped: {}", self.duplicates)?;
        writeln!(f, "  Elapsed: {:.2?}", self.elapsed)?;
        write!(f, "  Rate: {:.2} pages/sec", self.pages_per_second())
    }
}

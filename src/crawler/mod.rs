//! Concurrent crawl scheduling
//!
//! This module contains the crawl loop and everything it hands work to:
//! - [`Crawler`] and its builder, the scheduler loop
//! - the bounded frontier the fetch tasks feed
//! - the per-URL fetch task
//! - [`Link`] and the [`Processor`] trait callers implement
//! - user agent selection and crawl statistics

mod fetch;
mod frontier;
mod link;
mod scheduler;
mod stats;
mod user_agent;

pub use frontier::FRONTIER_CAPACITY;
pub use link::{Link, Processor};
pub use scheduler::{CrawlState, Crawler, CrawlerBuilder, CrawlerConfig, MAX_IDLE_TIMEOUT};
pub use stats::CrawlStats;
pub use user_agent::{user_agent, UserAgentPolicy, USER_AGENTS};

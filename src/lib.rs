//! Cake-Crawler: a bounded concurrent web crawler
//!
//! This crate implements a crawler that fetches pages through a
//! connection-limited HTTP engine, hands every page to a pluggable
//! [`Processor`](crawler::Processor) that extracts follow-on links, and
//! schedules those links until the frontier has been idle long enough.

pub mod config;
pub mod crawler;
pub mod filter;
pub mod network;
pub mod processor;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] network::FetchError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlStats, Crawler, Link, Processor};
pub use filter::{ConcurrentUrlSet, DuplicateFilter, UrlSet};
pub use network::{DownloadInfo, DownloadResult, FetchError, HttpEngine};

//! Configuration module for Cake-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use cake_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Idle timeout: {}s", config.crawler.idle_timeout_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerSettings, EngineSettings};

// Re-export parser functions
pub use parser::{load_config, parse_config};
pub use validation::validate;

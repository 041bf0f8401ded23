use crate::crawler::{CrawlerConfig, UserAgentPolicy};
use crate::network::EngineConfig;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure, as read from a TOML file
///
/// Every section and every key is optional; missing values fall back to
/// the same defaults the library uses when built without a file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub crawler: CrawlerSettings,
}

/// Fetch engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum number of concurrent outbound requests
    #[serde(rename = "max-connections")]
    pub max_connections: usize,

    /// Timeout for a whole request, body included (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Attempts per request before giving up
    pub retries: u32,

    /// Delay between `get` attempts (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Delay between download attempts (milliseconds)
    #[serde(rename = "download-retry-delay-ms")]
    pub download_retry_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_connections: defaults.max_connections,
            timeout_secs: defaults.timeout.as_secs(),
            retries: defaults.retries,
            retry_delay_ms: defaults.get_retry_delay.as_millis() as u64,
            download_retry_delay_ms: defaults.download_retry_delay.as_millis() as u64,
        }
    }
}

impl EngineSettings {
    /// Converts the file representation into the engine's runtime config
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_connections: self.max_connections,
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            get_retry_delay: Duration::from_millis(self.retry_delay_ms),
            download_retry_delay: Duration::from_millis(self.download_retry_delay_ms),
        }
    }
}

/// Crawl scheduler settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Capacity of the bounded frontier queue
    #[serde(rename = "frontier-capacity")]
    pub frontier_capacity: usize,

    /// Seconds without a new link before the frontier is closed
    #[serde(rename = "idle-timeout-secs")]
    pub idle_timeout_secs: u64,

    /// Politeness pause after each successful fetch (milliseconds)
    #[serde(rename = "fetch-interval-ms")]
    pub fetch_interval_ms: u64,

    /// "fixed", "rotate", or a literal user agent string
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Index into the built-in user agent list when `user-agent = "fixed"`
    #[serde(rename = "user-agent-index")]
    pub user_agent_index: usize,

    /// Only follow links that stay on the start URL's host
    #[serde(rename = "same-host-only")]
    pub same_host_only: bool,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        let defaults = CrawlerConfig::default();
        Self {
            frontier_capacity: defaults.frontier_capacity,
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            fetch_interval_ms: defaults.fetch_interval.as_millis() as u64,
            user_agent: "fixed".to_string(),
            user_agent_index: 0,
            same_host_only: true,
        }
    }
}

impl CrawlerSettings {
    /// Resolves the `user-agent` keys into a policy
    pub fn user_agent_policy(&self) -> UserAgentPolicy {
        match self.user_agent.as_str() {
            "fixed" => UserAgentPolicy::Fixed(self.user_agent_index),
            "rotate" => UserAgentPolicy::rotate(),
            custom => UserAgentPolicy::Custom(custom.to_string()),
        }
    }

    /// Converts the file representation into the scheduler's runtime config
    pub fn to_crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            frontier_capacity: self.frontier_capacity,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            fetch_interval: Duration::from_millis(self.fetch_interval_ms),
            user_agent: self.user_agent_policy(),
        }
    }
}

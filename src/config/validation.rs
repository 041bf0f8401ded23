use crate::config::types::{Config, CrawlerSettings, EngineSettings};
use crate::crawler::{MAX_IDLE_TIMEOUT, USER_AGENTS};
use crate::ConfigError;

/// Upper bound on `max-connections`
const MAX_CONNECTIONS_LIMIT: usize = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_settings(&config.engine)?;
    validate_crawler_settings(&config.crawler)?;
    Ok(())
}

/// Validates fetch engine settings
fn validate_engine_settings(engine: &EngineSettings) -> Result<(), ConfigError> {
    if engine.max_connections < 1 || engine.max_connections > MAX_CONNECTIONS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-connections must be between 1 and {}, got {}",
            MAX_CONNECTIONS_LIMIT, engine.max_connections
        )));
    }

    if engine.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if engine.retries == 0 {
        return Err(ConfigError::Validation("retries must be >= 1".to_string()));
    }

    Ok(())
}

/// Validates crawl scheduler settings
fn validate_crawler_settings(crawler: &CrawlerSettings) -> Result<(), ConfigError> {
    if crawler.frontier_capacity == 0 {
        return Err(ConfigError::Validation(
            "frontier-capacity must be >= 1".to_string(),
        ));
    }

    if crawler.idle_timeout_secs > MAX_IDLE_TIMEOUT.as_secs() {
        return Err(ConfigError::Validation(format!(
            "idle-timeout-secs must be at most {}, got {}",
            MAX_IDLE_TIMEOUT.as_secs(),
            crawler.idle_timeout_secs
        )));
    }

    if crawler.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if crawler.user_agent == "fixed" && crawler.user_agent_index >= USER_AGENTS.len() {
        return Err(ConfigError::Validation(format!(
            "user-agent-index must be below {}, got {}",
            USER_AGENTS.len(),
            crawler.user_agent_index
        )));
    }

    Ok(())
}

//! Connection-limited HTTP engine
//!
//! One engine instance is meant to be shared (behind an `Arc`) by every
//! task that talks to the same kind of target. The engine owns a single
//! permit pool; `get` and `download` draw from the same pool, so the
//! ceiling holds no matter how many callers are waiting.

use crate::network::{FetchError, MAX_CONNECTIONS, RETRIES, TIMEOUT_SECS};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Immutable engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of requests with an outstanding network call
    pub max_connections: usize,

    /// Timeout covering the whole request, body included
    pub timeout: Duration,

    /// Attempts per request before a terminal error is returned
    pub retries: u32,

    /// Constant pause between `get` attempts
    pub get_retry_delay: Duration,

    /// Constant pause between `download` attempts
    pub download_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            timeout: Duration::from_secs(TIMEOUT_SECS),
            retries: RETRIES,
            get_retry_delay: Duration::from_secs(1),
            download_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Bounded-concurrency HTTP client with retry
#[derive(Debug)]
pub struct HttpEngine {
    config: EngineConfig,
    client: Client,
    permits: Semaphore,
}

/// Outcome of a single attempt that did not succeed
pub(crate) struct AttemptFailure {
    pub status: Option<u16>,
    pub cause: String,
}

impl HttpEngine {
    /// Creates an engine with the default ceiling (50), timeout (30s) and retries (3)
    pub fn new() -> Self {
        Self::from_config(EngineConfig::default())
    }

    /// Creates an engine with explicit ceiling, timeout and retry count
    ///
    /// Retry delays keep their defaults (1s for `get`, 2s for `download`).
    pub fn with_params(max_connections: usize, timeout: Duration, retries: u32) -> Self {
        Self::from_config(EngineConfig {
            max_connections,
            timeout,
            retries,
            ..EngineConfig::default()
        })
    }

    /// Creates an engine from a full configuration
    ///
    /// A ceiling of zero would block every caller forever and zero retries
    /// would never issue a request, so both are raised to one. A ceiling
    /// above `Semaphore::MAX_PERMITS` is lowered to it.
    pub fn from_config(mut config: EngineConfig) -> Self {
        if config.max_connections == 0 {
            tracing::warn!("max_connections of 0 requested, using 1");
            config.max_connections = 1;
        }
        if config.max_connections > Semaphore::MAX_PERMITS {
            tracing::warn!(
                "max_connections of {} requested, using {}",
                config.max_connections,
                Semaphore::MAX_PERMITS
            );
            config.max_connections = Semaphore::MAX_PERMITS;
        }
        if config.retries == 0 {
            tracing::warn!("retries of 0 requested, using 1");
            config.retries = 1;
        }

        let client = build_http_client(config.timeout);
        let permits = Semaphore::new(config.max_connections);

        Self {
            config,
            client,
            permits,
        }
    }

    /// Returns the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of permits currently free
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of operations currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.config.max_connections - self.permits.available_permits()
    }

    /// Waits for a free permit; the permit is returned to the pool when dropped
    pub(crate) async fn acquire(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| FetchError::EngineClosed)
    }

    /// Fetches a URL and returns the whole body as text
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Transport error / timeout | Retry after `get_retry_delay` |
    /// | Status other than 200 | Retry after `get_retry_delay` |
    /// | Body read error | Retry after `get_retry_delay` |
    /// | `retries` attempts failed | `FetchError::RetriesExhausted` |
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `headers` - Optional header name/value pairs set on every attempt
    pub async fn get(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<String, FetchError> {
        let _permit = self.acquire().await?;

        let header_map = build_header_map("GET", url, headers)?;
        let retries = self.config.retries;
        let mut last = AttemptFailure {
            status: None,
            cause: String::new(),
        };

        for attempt in 0..retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.get_retry_delay).await;
            }

            let response = match self.send(url, &header_map).await {
                Ok(response) => response,
                Err(failure) => {
                    tracing::warn!(
                        "[GET] Retries: {} -> Http Url: \"{}\" Error: {}",
                        attempt,
                        url,
                        failure.cause
                    );
                    last = failure;
                    continue;
                }
            };

            let status = response.status().as_u16();
            match response.text().await {
                Ok(body) => {
                    tracing::info!("[GET] 200 -> {}", url);
                    return Ok(body);
                }
                Err(e) => {
                    tracing::warn!(
                        "[GET] Retries: {} -> Http ReadAll: \"{}\" Error: {}",
                        attempt,
                        url,
                        e
                    );
                    last = AttemptFailure {
                        status: Some(status),
                        cause: e.to_string(),
                    };
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            op: "GET",
            url: url.to_string(),
            retries,
            status: last.status,
            cause: last.cause,
        })
    }

    /// Sends one request and accepts only a 200 response
    ///
    /// Any other status is reported as a failed attempt; the response is
    /// dropped here, which releases its connection.
    pub(crate) async fn send(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Response, AttemptFailure> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| AttemptFailure {
                status: e.status().map(|s| s.as_u16()),
                cause: classify_error(&e),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AttemptFailure {
                status: Some(status.as_u16()),
                cause: format!("Http Status: {}", status.as_u16()),
            });
        }

        Ok(response)
    }
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the underlying reqwest client
///
/// Falls back to a default client if the builder fails (for example when
/// the TLS backend cannot be initialised); the per-request timeout is then
/// applied on each request instead.
fn build_http_client(timeout: Duration) -> Client {
    match Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to build HTTP client ({}), using defaults", e);
            Client::new()
        }
    }
}

/// Converts caller supplied header pairs into a `HeaderMap`
pub(crate) fn build_header_map(
    op: &str,
    url: &str,
    headers: Option<&HashMap<String, String>>,
) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    let Some(headers) = headers else {
        return Ok(map);
    };

    for (name, value) in headers {
        tracing::debug!("[{}] Url: {} Add Header: [{} : {}]", op, url, name, value);
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::Validation(format!("Invalid header name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            FetchError::Validation(format!("Invalid value for header '{}': {}", name, e))
        })?;
        map.insert(header_name, header_value);
    }

    Ok(map)
}

/// Produces a short description of a transport error
fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Request timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}

//! Bounded HTTP fetch engine
//!
//! This module contains:
//! - The connection-limited [`HttpEngine`] shared by all fetch tasks
//! - `get` for whole-body text retrieval with retry
//! - `download` for streaming a response body into a local file
//! - The fetch error taxonomy

mod download;
mod engine;

pub use download::{format_file_size, DownloadInfo, DownloadResult, DOWNLOAD_BUFFER_SIZE};
pub use engine::{EngineConfig, HttpEngine};

use std::path::PathBuf;
use thiserror::Error;

/// Default ceiling on concurrent outbound requests
pub const MAX_CONNECTIONS: usize = 50;

/// Default per-request timeout in seconds
pub const TIMEOUT_SECS: u64 = 30;

/// Default number of attempts per request
pub const RETRIES: u32 = 3;

/// Errors surfaced by the fetch engine
///
/// Transient failures (transport errors, non-200 statuses, body read errors)
/// are retried internally and only show up here once retries are exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("[{op}] Retry \"{retries}\" but still can't fetch Url: {url} status: {} ({cause})", display_status(.status))]
    RetriesExhausted {
        op: &'static str,
        url: String,
        retries: u32,
        status: Option<u16>,
        cause: String,
    },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("File: {} already exists. skip download", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Write to {} failed after {written} bytes: {source}", .path.display())]
    Write {
        path: PathBuf,
        written: u64,
        source: std::io::Error,
    },

    #[error("HTTP engine permit pool is closed")]
    EngineClosed,
}

fn display_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl FetchError {
    /// Returns true if the error was produced before any network call
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the last HTTP status seen, if retries were exhausted
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RetriesExhausted { status, .. } => *status,
            _ => None,
        }
    }
}

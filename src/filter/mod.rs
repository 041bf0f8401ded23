//! Duplicate URL filtering
//!
//! The crawl scheduler asks a [`DuplicateFilter`] about every URL it pulls
//! off the frontier and only dispatches the ones reported as new. Two
//! implementations are provided:
//! - [`UrlSet`], a mutex-guarded set
//! - [`ConcurrentUrlSet`], a set owned by one worker task and mutated only
//!   through a bounded command queue

mod concurrent;
mod url_set;

pub use concurrent::ConcurrentUrlSet;
pub use url_set::UrlSet;

use async_trait::async_trait;
use std::sync::Arc;

/// Decides whether a URL has already been scheduled
///
/// Once a URL has been reported as new (`false`), every later call with the
/// same URL must return `true` for the lifetime of the filter.
#[async_trait]
pub trait DuplicateFilter: Send + Sync {
    /// Records the URL and returns true if it was already present
    async fn check_duplicate(&self, url: &str) -> bool;
}

#[async_trait]
impl<T: DuplicateFilter + ?Sized> DuplicateFilter for Arc<T> {
    async fn check_duplicate(&self, url: &str) -> bool {
        (**self).check_duplicate(url).await
    }
}

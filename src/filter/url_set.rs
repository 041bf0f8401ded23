use crate::filter::DuplicateFilter;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Initial capacity of a new set
const POOL_SIZE: usize = 128;

/// Counter used to name sets created without a name
static DEFAULT_NAME_NUMBER: AtomicU32 = AtomicU32::new(1);

/// Thread-safe set of URL strings
#[derive(Debug)]
pub struct UrlSet {
    name: String,
    inner: Mutex<HashSet<String>>,
}

impl UrlSet {
    /// Creates an empty set
    ///
    /// An empty name is replaced by a generated `Default-Set-N` name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: resolve_name(name.into()),
            inner: Mutex::new(HashSet::with_capacity(POOL_SIZE)),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a URL; returns true if it was not present before
    pub fn add(&self, url: &str) -> bool {
        if url.is_empty() {
            tracing::warn!("url is empty. Do not add to \"{}\".", self.name);
            return false;
        }
        self.lock().insert(url.to_string())
    }

    /// Removes a URL; returns true if it was present
    pub fn remove(&self, url: &str) -> bool {
        if url.is_empty() {
            tracing::warn!("url is empty. Remove nothing in \"{}\".", self.name);
            return false;
        }
        self.lock().remove(url)
    }

    /// Returns true if the URL is in the set
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Number of URLs in the set
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the set is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Dumps the set contents to the log (debugging aid)
    pub fn log_contents(&self) {
        let inner = self.lock();
        if inner.is_empty() {
            tracing::info!("UrlSet \"{}\" has no elements.", self.name);
            return;
        }

        let mut urls: Vec<&String> = inner.iter().collect();
        urls.sort();
        let mut dump = format!("UrlSet \"{}\" values (\n", self.name);
        for url in urls {
            dump.push('\t');
            dump.push_str(url);
            dump.push('\n');
        }
        dump.push(')');
        tracing::debug!("{}", dump);
    }

    // A panic while holding the lock can't leave a HashSet half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for UrlSet {
    fn default() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl DuplicateFilter for UrlSet {
    async fn check_duplicate(&self, url: &str) -> bool {
        !self.add(url)
    }
}

/// Returns the given name, or a generated one if it is empty
pub(crate) fn resolve_name(name: String) -> String {
    if !name.is_empty() {
        return name;
    }
    let number = DEFAULT_NAME_NUMBER.fetch_add(1, Ordering::Relaxed) + 1;
    let generated = format!("Default-Set-{}", number);
    tracing::warn!("No name specified. Using name \"{}\"", generated);
    generated
}

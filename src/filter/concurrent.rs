use crate::filter::url_set::resolve_name;
use crate::filter::DuplicateFilter;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests serviced by the set's worker task
#[derive(Debug)]
enum SetCommand {
    Insert {
        url: String,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        url: String,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// URL set owned by a single worker task
///
/// Every mutation travels through a bounded command queue and is applied by
/// the worker in arrival order, so the underlying `HashSet` needs no lock.
/// Must be created from within a tokio runtime.
#[derive(Debug)]
pub struct ConcurrentUrlSet {
    name: String,
    sender: Mutex<Option<mpsc::Sender<SetCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConcurrentUrlSet {
    /// Creates the set and spawns its worker
    ///
    /// # Arguments
    ///
    /// * `name` - Set name used in log messages (generated when empty)
    /// * `buffer_size` - Capacity of the command queue (at least 1)
    pub fn new(name: impl Into<String>, buffer_size: usize) -> Self {
        let name = resolve_name(name.into());
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let worker = tokio::spawn(run_worker(name.clone(), receiver));

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a URL; returns true if it was not present before
    ///
    /// Returns false without touching the set once the set is closed.
    pub async fn add(&self, url: &str) -> bool {
        if url.is_empty() {
            tracing::warn!("url is empty. Do not add to \"{}\".", self.name);
            return false;
        }
        let Some(sender) = self.sender() else {
            tracing::warn!("ConcurrentUrlSet \"{}\" was closed. Nothing was added", self.name);
            return false;
        };

        let (reply, response) = oneshot::channel();
        let command = SetCommand::Insert {
            url: url.to_string(),
            reply,
        };
        if sender.send(command).await.is_err() {
            tracing::warn!("ConcurrentUrlSet \"{}\" worker is gone. Nothing was added", self.name);
            return false;
        }

        response.await.unwrap_or(false)
    }

    /// Queues removal of a URL
    ///
    /// Returns once the request is queued; later commands from the same
    /// caller are applied after it.
    pub async fn remove(&self, url: &str) {
        if url.is_empty() {
            tracing::warn!("url is empty. Remove nothing in \"{}\".", self.name);
            return;
        }
        let Some(sender) = self.sender() else {
            tracing::warn!("ConcurrentUrlSet \"{}\" was closed. Nothing was removed", self.name);
            return;
        };

        let command = SetCommand::Remove {
            url: url.to_string(),
        };
        if sender.send(command).await.is_err() {
            tracing::warn!("ConcurrentUrlSet \"{}\" worker is gone. Nothing was removed", self.name);
        }
    }

    /// Number of URLs in the set (0 once closed)
    pub async fn len(&self) -> usize {
        let Some(sender) = self.sender() else {
            return 0;
        };

        let (reply, response) = oneshot::channel();
        if sender.send(SetCommand::Len { reply }).await.is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Returns true if the set is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns true once `close` has been called
    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Stops accepting commands, lets the worker drain the queue, and waits for it
    ///
    /// Calling `close` again is a no-op.
    pub async fn close(&self) {
        let sender = lock(&self.sender).take();
        let worker = lock(&self.worker).take();

        if sender.is_none() {
            tracing::debug!("ConcurrentUrlSet \"{}\" already closed", self.name);
        }
        drop(sender);

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!("ConcurrentUrlSet \"{}\" worker failed: {}", self.name, e);
            }
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<SetCommand>> {
        lock(&self.sender).clone()
    }
}

#[async_trait]
impl DuplicateFilter for ConcurrentUrlSet {
    async fn check_duplicate(&self, url: &str) -> bool {
        !self.add(url).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Applies commands until every sender is dropped
async fn run_worker(name: String, mut receiver: mpsc::Receiver<SetCommand>) {
    let mut set: HashSet<String> = HashSet::new();

    while let Some(command) = receiver.recv().await {
        match command {
            SetCommand::Insert { url, reply } => {
                tracing::trace!("Add v: {}", url);
                let inserted = set.insert(url);
                // The caller may have given up waiting
                let _ = reply.send(inserted);
            }
            SetCommand::Remove { url } => {
                tracing::trace!("Remove v: {}", url);
                set.remove(&url);
            }
            SetCommand::Len { reply } => {
                let _ = reply.send(set.len());
            }
        }
    }

    tracing::debug!("ConcurrentUrlSet \"{}\" is closed with {} urls.", name, set.len());
}

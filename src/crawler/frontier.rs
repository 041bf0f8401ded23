//! Bounded frontier queue
//!
//! The frontier is a bounded channel: fetch tasks push discovered links
//! and wait when it is full, the scheduler loop is the only consumer.
//! Closing it rejects further pushes while still letting the scheduler
//! drain what was already queued.

use crate::crawler::Link;
use tokio::sync::mpsc;

/// Default frontier capacity
pub const FRONTIER_CAPACITY: usize = 100;

/// Consumer side of the frontier, owned by the scheduler loop
#[derive(Debug)]
pub(crate) struct Frontier {
    receiver: mpsc::Receiver<Link>,
    closed: bool,
}

/// Producer side of the frontier, cloned into every fetch task
#[derive(Debug, Clone)]
pub(crate) struct FrontierSender {
    sender: mpsc::Sender<Link>,
}

impl Frontier {
    /// Creates a frontier with room for `capacity` links (at least one)
    pub fn new(capacity: usize) -> (Frontier, FrontierSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Frontier {
                receiver,
                closed: false,
            },
            FrontierSender { sender },
        )
    }

    /// Waits for the next link; `None` once closed and drained
    pub async fn recv(&mut self) -> Option<Link> {
        self.receiver.recv().await
    }

    /// Stops accepting links; blocked producers are released with an error
    pub fn close(&mut self) {
        self.receiver.close();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrontierSender {
    /// Queues a link, waiting while the frontier is full
    ///
    /// Gives the link back if the frontier has been closed.
    pub async fn push(&self, link: Link) -> Result<(), Link> {
        self.sender.send(link).await.map_err(|e| e.0)
    }

    /// Queues a link only if there is room right now
    pub fn try_push(&self, link: Link) -> Result<(), Link> {
        self.sender.try_send(link).map_err(|e| match e {
            mpsc::error::TrySendError::Full(link) | mpsc::error::TrySendError::Closed(link) => {
                link
            }
        })
    }
}

//! Per-URL fetch task
//!
//! Each link the scheduler dispatches becomes one of these tasks: fetch
//! the page through the shared engine, hand the body to the processor,
//! push whatever it found back into the frontier, then pause.

use crate::crawler::frontier::FrontierSender;
use crate::crawler::{Link, Processor, UserAgentPolicy};
use crate::network::HttpEngine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a fetch task reports back to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOutcome {
    Success,
    Failure,
}

/// Everything a fetch task shares with its siblings
pub(crate) struct FetchContext {
    pub engine: Arc<HttpEngine>,
    pub processor: Arc<dyn Processor>,
    pub frontier: FrontierSender,
    pub user_agent: UserAgentPolicy,
    pub fetch_interval: Duration,
}

pub(crate) async fn fetch_page(context: Arc<FetchContext>, link: Link) -> FetchOutcome {
    let mut headers = HashMap::new();
    headers.insert(
        "User-Agent".to_string(),
        context.user_agent.pick().to_string(),
    );

    let body = match context.engine.get(link.url(), Some(&headers)).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Fetch {} failed: {}", link.url(), e);
            return FetchOutcome::Failure;
        }
    };

    let discovered = context.processor.process(&link, &body);
    tracing::debug!("{} yielded {} links", link.url(), discovered.len());

    let mut remaining = discovered.into_iter();
    while let Some(next) = remaining.next() {
        if let Err(dropped) = context.frontier.push(next).await {
            tracing::debug!(
                "Frontier closed, dropping {} and {} more links found on {}",
                dropped.url(),
                remaining.len(),
                link.url()
            );
            break;
        }
    }

    tokio::time::sleep(context.fetch_interval).await;
    FetchOutcome::Success
}

//! Ingestion pipeline module
//!
//! This module contains the fetch → extract → publish pipeline:
//! - `Fetcher`: robots-gated HTTP retrieval with proxy rotation and retry
//! - `PageSource` / `StaticPage`: where page markup comes from
//! - `ListingExtractor`: markup → listings
//! - `WorkerLoop`: drives one pass per target through the pass state machine

mod extractor;
mod fetcher;
mod source;
mod worker;

pub use extractor::{Extraction, ExtractionSchema, ListingExtractor};
pub use fetcher::{backoff_delay, build_http_client, AttemptOutcome, FetchAttempt, Fetcher};
pub use source::{PageSource, StaticPage};
pub use worker::WorkerLoop;

use crate::output::PassSummary;
use crate::publish::QueueConnector;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs one worker pass per target, at most `max_concurrent` at a time
///
/// Each pass gets its own clone of `source` and its own queue channel.
///
/// # Arguments
///
/// * `targets` - Target URLs, one pass each
/// * `source` - Page source cloned into every pass
/// * `extractor` - Shared listing extractor
/// * `connector` - Opens one queue channel per pass
/// * `max_concurrent` - Upper bound on passes in flight
/// * `cancel` - Cancels every pass between steps
///
/// # Returns
///
/// One summary per target, in target order.
pub async fn run_passes<S, C>(
    targets: &[String],
    source: S,
    extractor: Arc<ListingExtractor>,
    connector: Arc<C>,
    max_concurrent: usize,
    cancel: CancellationToken,
) -> Vec<PassSummary>
where
    S: PageSource + Clone + 'static,
    C: QueueConnector + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    tracing::info!(
        "Running {} target(s) with up to {} concurrent pass(es)",
        targets.len(),
        max_concurrent.max(1)
    );

    for (index, target) in targets.iter().enumerate() {
        let target = target.clone();
        let semaphore = semaphore.clone();
        let source = source.clone();
        let extractor = extractor.clone();
        let connector = connector.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();

            let mut worker = WorkerLoop::new(source, extractor, connector).with_cancellation(cancel);
            let summary = match worker.run(&target).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!("Pass for {} failed: {}", target, e);
                    PassSummary::errored(&target, e.to_string())
                }
            };
            (index, summary)
        });
    }

    let mut summaries: Vec<Option<PassSummary>> = vec![None; targets.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, summary)) => summaries[index] = Some(summary),
            Err(e) => tracing::error!("Worker task failed: {}", e),
        }
    }

    summaries
        .into_iter()
        .zip(targets)
        .map(|(summary, target)| {
            summary.unwrap_or_else(|| PassSummary::errored(target, "worker task did not complete"))
        })
        .collect()
}

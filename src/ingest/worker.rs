//! Worker loop driving one pass over a target
//!
//! A pass opens its queue channel first, then walks
//! `RobotsCheck → Fetching → Extracting → Publishing(i) → Done`, stopping in
//! `Failed(reason)` when a step aborts. The channel is closed on every exit.

use crate::ingest::{ListingExtractor, PageSource};
use crate::output::PassSummary;
use crate::publish::{Delivery, Publisher, QueueConnector};
use crate::state::{FailureReason, PassState};
use crate::{FetchError, IngestError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs fetch → extract → publish passes for one page source
pub struct WorkerLoop<S, C> {
    source: S,
    extractor: Arc<ListingExtractor>,
    connector: Arc<C>,
    cancel: CancellationToken,
    state: PassState,
}

impl<S: PageSource, C: QueueConnector> WorkerLoop<S, C> {
    pub fn new(source: S, extractor: Arc<ListingExtractor>, connector: Arc<C>) -> Self {
        Self {
            source,
            extractor,
            connector,
            cancel: CancellationToken::new(),
            state: PassState::Idle,
        }
    }

    /// Attaches a cancellation token checked between steps
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The state of the current (or last) pass
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Runs one pass over `target`
    ///
    /// # Returns
    ///
    /// * `Ok(PassSummary)` - The pass reached a terminal state; aborted passes
    ///   report `PassOutcome::Failed` rather than an error
    /// * `Err(IngestError::InvalidTransition)` - The state machine was driven
    ///   out of order
    pub async fn run(&mut self, target: &str) -> crate::Result<PassSummary> {
        self.state = PassState::Idle;
        let mut summary = PassSummary::new(target);

        tracing::info!("Starting pass for {}", target);

        if self.cancel.is_cancelled() {
            self.cancel_pass(&mut summary)?;
            summary.finish(self.state);
            return Ok(summary);
        }

        // Not raced against `cancel`: every opened channel must reach `close()`
        let channel = match self.connector.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("Broker unavailable for {}: {}", target, e);
                summary.error = Some(IngestError::BrokerUnavailable(e.to_string()).to_string());
                self.transition(PassState::Failed(FailureReason::BrokerUnavailable))?;
                summary.finish(self.state);
                return Ok(summary);
            }
        };

        let result = self.drive(target, &channel, &mut summary).await;

        if let Err(e) = channel.close().await {
            tracing::warn!("Error closing broker channel for {}: {}", target, e);
        }

        result?;
        summary.finish(self.state);

        if summary.is_success() {
            tracing::info!("{}", summary.summary_line());
        } else {
            tracing::warn!("{}", summary.summary_line());
        }

        Ok(summary)
    }

    async fn drive(
        &mut self,
        target: &str,
        channel: &C::Channel,
        summary: &mut PassSummary,
    ) -> crate::Result<()> {
        if self.cancel.is_cancelled() {
            return self.cancel_pass(summary);
        }

        self.transition(PassState::RobotsCheck)?;

        let allowed = tokio::select! {
            _ = self.cancel.cancelled() => None,
            allowed = self.source.allowed(target) => Some(allowed),
        };
        match allowed {
            None => return self.cancel_pass(summary),
            Some(false) => {
                let error = FetchError::Blocked {
                    url: target.to_string(),
                };
                tracing::info!("{}", error);
                summary.error = Some(error.to_string());
                return self.transition(PassState::Failed(FailureReason::Blocked));
            }
            Some(true) => {}
        }

        self.transition(PassState::Fetching)?;

        let html = match self.source.retrieve(target).await {
            Ok(html) => html,
            Err(FetchError::Cancelled { .. }) => return self.cancel_pass(summary),
            Err(FetchError::Blocked { url }) => {
                tracing::warn!("Fetch blocked after robots check: {}", url);
                summary.error = Some(format!("URL disallowed by robots.txt: {}", url));
                return self.transition(PassState::Failed(FailureReason::Blocked));
            }
            Err(e) => {
                tracing::error!("Failed to fetch {}: {}", target, e);
                summary.error = Some(e.to_string());
                return self.transition(PassState::Failed(FailureReason::FetchFailed));
            }
        };

        if self.cancel.is_cancelled() {
            return self.cancel_pass(summary);
        }

        self.transition(PassState::Extracting)?;

        let extraction = self.extractor.extract_report(&html);
        summary.attempted = extraction.candidates;
        summary.extracted = extraction.listings.len();

        tracing::debug!(
            "Extracted {} of {} candidates from {} ({} skipped)",
            extraction.listings.len(),
            extraction.candidates,
            target,
            extraction.skipped
        );

        if extraction.listings.is_empty() {
            tracing::info!("No listings found on {}", target);
            return self.transition(PassState::Done);
        }

        for (index, listing) in extraction.listings.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.cancel_pass(summary);
            }

            self.transition(PassState::Publishing(index))?;

            match channel.publish(listing).await {
                Ok(Delivery::Confirmed) => summary.published += 1,
                Ok(Delivery::Unconfirmed) => {
                    summary.published += 1;
                    summary.unconfirmed += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        "Failed to publish listing {} ('{}') from {}: {}",
                        index,
                        listing.title(),
                        target,
                        e
                    );
                }
            }
        }

        self.transition(PassState::Done)
    }

    fn cancel_pass(&mut self, summary: &mut PassSummary) -> crate::Result<()> {
        tracing::info!("Pass for {} cancelled in state {}", summary.target, self.state);
        summary.error = Some(IngestError::Cancelled.to_string());
        self.transition(PassState::Failed(FailureReason::Cancelled))
    }

    fn transition(&mut self, next: PassState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Pass state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

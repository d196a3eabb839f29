//! Per-pass summaries and the end-of-run report

use crate::state::{FailureReason, PassState};
use chrono::{DateTime, Utc};
use std::fmt;

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// At least one listing was extracted and every publish was attempted
    Completed,

    /// The page held no complete listings; not an error
    Empty,

    /// The pass aborted
    Failed(FailureReason),

    /// The worker itself failed (task panic or an out-of-order transition)
    Errored,
}

impl PassOutcome {
    /// Derives the outcome from the pass's terminal state
    pub fn from_state(state: PassState, extracted: usize) -> Self {
        match state {
            PassState::Failed(reason) => Self::Failed(reason),
            _ if extracted == 0 => Self::Empty,
            _ => Self::Completed,
        }
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Empty => write!(f, "empty"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Result of one worker pass over a target
#[derive(Debug, Clone)]
pub struct PassSummary {
    /// The target URL
    pub target: String,

    /// Candidate containers examined
    pub attempted: usize,

    /// Complete listings extracted
    pub extracted: usize,

    /// Listings the transport accepted
    pub published: usize,

    /// Of `published`, those the broker never confirmed
    pub unconfirmed: usize,

    /// Listings whose publish failed
    pub failed: usize,

    pub outcome: PassOutcome,

    /// The error that aborted the pass, if any
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl PassSummary {
    /// Creates an empty summary for a pass starting now
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attempted: 0,
            extracted: 0,
            published: 0,
            unconfirmed: 0,
            failed: 0,
            outcome: PassOutcome::Empty,
            error: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Returns true unless the pass aborted
    ///
    /// Empty pages and individual publish failures still count as success.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PassOutcome::Completed | PassOutcome::Empty)
    }

    /// Summary for a pass that ended with an internal error
    pub fn errored(target: impl Into<String>, error: impl Into<String>) -> Self {
        let mut summary = Self::new(target);
        summary.outcome = PassOutcome::Errored;
        summary.error = Some(error.into());
        summary
    }

    /// Records the terminal state and stops the clock
    pub fn finish(&mut self, state: PassState) {
        self.outcome = PassOutcome::from_state(state, self.extracted);
        let elapsed = Utc::now() - self.started_at;
        self.duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);
    }

    /// One-line summary used in logs and the terminal report
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}: attempted={} extracted={} published={} failed={} outcome={}",
            self.target, self.attempted, self.extracted, self.published, self.failed, self.outcome
        );
        if self.unconfirmed > 0 {
            line.push_str(&format!(" unconfirmed={}", self.unconfirmed));
        }
        line
    }
}

/// Totals across every pass of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub targets: usize,
    pub succeeded: usize,
    pub aborted: usize,
    pub attempted: usize,
    pub extracted: usize,
    pub published: usize,
    pub unconfirmed: usize,
    pub failed: usize,
}

impl RunStatistics {
    pub fn from_summaries(summaries: &[PassSummary]) -> Self {
        summaries.iter().fold(Self::default(), |mut stats, summary| {
            stats.targets += 1;
            if summary.is_success() {
                stats.succeeded += 1;
            } else {
                stats.aborted += 1;
            }
            stats.attempted += summary.attempted;
            stats.extracted += summary.extracted;
            stats.published += summary.published;
            stats.unconfirmed += summary.unconfirmed;
            stats.failed += summary.failed;
            stats
        })
    }

    /// Returns true if every pass completed
    pub fn all_succeeded(&self) -> bool {
        self.aborted == 0
    }
}

/// Prints per-target results and run totals to stdout
///
/// # Arguments
///
/// * `summaries` - One summary per target, in target order
pub fn print_summary(summaries: &[PassSummary]) {
    let stats = RunStatistics::from_summaries(summaries);

    println!("=== Ingestion Summary ===\n");

    println!("Targets:");
    for summary in summaries {
        println!("  {} ({} ms)", summary.summary_line(), summary.duration_ms);
        if let Some(error) = &summary.error {
            println!("    error: {}", error);
        }
    }
    println!();

    println!("Totals:");
    println!("  Targets: {} ({} aborted)", stats.targets, stats.aborted);
    println!("  Candidates examined: {}", stats.attempted);
    println!("  Listings extracted: {}", stats.extracted);
    println!("  Listings published: {}", stats.published);
    if stats.unconfirmed > 0 {
        println!("  Published without broker confirmation: {}", stats.unconfirmed);
    }
    println!("  Publish failures: {}", stats.failed);
    println!();

    let publish_rate = if stats.extracted > 0 {
        (stats.published as f64 / stats.extracted as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Publish Rate: {:.1}% ({} / {} listings published)",
        publish_rate, stats.published, stats.extracted
    );
}

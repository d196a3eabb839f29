//! Output module for reporting pass results
//!
//! This module handles:
//! - Per-target pass summaries
//! - Run totals and the terminal report

mod summary;

pub use summary::{print_summary, PassOutcome, PassSummary, RunStatistics};

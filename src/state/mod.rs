//! State module for tracking pass progress
//!
//! # Components
//!
//! - `PassState`: where a single worker pass is (robots check, fetching, publishing, ...)
//! - `FailureReason`: why a pass was aborted

mod pass_state;

// Re-export main types
pub use pass_state::{FailureReason, PassState};

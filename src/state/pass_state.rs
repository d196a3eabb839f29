/// Pass state definitions for the ingestion worker
///
/// This module defines every state one worker pass can be in and the
/// transitions allowed between them.
use std::fmt;

/// Why a pass ended in [`PassState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// robots.txt disallows the target
    Blocked,

    /// The fetcher gave up on the target page
    FetchFailed,

    /// The queue connection or declaration could not be established
    BrokerUnavailable,

    /// The pass was cancelled (shutdown signal or deadline)
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::FetchFailed => "fetch_failed",
            Self::BrokerUnavailable => "broker_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents the current state of one ingestion pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassState {
    // ===== Active States =====
    /// Pass created, queue connection being opened
    Idle,

    /// Consulting robots.txt for the target
    RobotsCheck,

    /// Retrieving the target page
    Fetching,

    /// Extracting listings from the page body
    Extracting,

    /// Publishing the listing at this index
    Publishing(usize),

    // ===== Terminal States =====
    /// Pass completed (possibly with zero listings or some publish failures)
    Done,

    /// Pass aborted
    Failed(FailureReason),
}

impl PassState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Returns true if the pass is still in progress
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// Cancellation and broker loss may interrupt any active state; every
    /// other failure is tied to the step that raises it.
    pub fn can_transition_to(&self, next: PassState) -> bool {
        use FailureReason::*;
        use PassState::*;

        match (*self, next) {
            (Idle, RobotsCheck) => true,
            (RobotsCheck, Fetching) | (RobotsCheck, Failed(Blocked)) => true,
            (Fetching, Extracting) | (Fetching, Failed(FetchFailed)) => true,
            (Extracting, Done) | (Extracting, Publishing(0)) => true,
            (Publishing(i), Publishing(j)) => j == i + 1,
            (Publishing(_), Done) => true,
            (current, Failed(Cancelled)) | (current, Failed(BrokerUnavailable)) => {
                current.is_active()
            }
            _ => false,
        }
    }

    /// Short machine-readable name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RobotsCheck => "robots_check",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Publishing(_) => "publishing",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publishing(i) => write!(f, "publishing({})", i),
            Self::Failed(reason) => write!(f, "failed({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

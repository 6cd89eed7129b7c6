/// Per-URL status definitions
///
/// A discovered URL carries two independent statuses: whether the pattern
/// filter accepted it, and how far its content crawl got.
use std::fmt;

/// Outcome of checking a discovered URL against the task's patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStatus {
    /// Not yet checked by the runner
    Pending,

    /// Passed the include/exclude rules
    Confirmed,

    /// Rejected by the include/exclude rules
    RejectedByPattern,
}

impl LinkStatus {
    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::RejectedByPattern => "rejected_by_pattern",
        }
    }

    /// Parses a status from a database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "rejected_by_pattern" => Some(Self::RejectedByPattern),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Content crawl progress of a discovered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    // ===== Active States =====
    /// Waiting in the frontier
    NotStarted,

    /// Claimed by a runner batch
    InProgress,

    // ===== Terminal States =====
    /// Content was extracted and stored
    Succeeded,

    /// Fetch failed after retries; the error message is kept
    Failed,

    /// Not fetched: rejected by pattern or content crawling disabled
    Skipped,
}

impl CrawlStatus {
    /// Returns true if the runner will never pick this URL up again
    ///
    /// Only an explicit recrawl moves a terminal URL back to `NotStarted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from a database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns all possible crawl statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::NotStarted,
            Self::InProgress,
            Self::Succeeded,
            Self::Failed,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

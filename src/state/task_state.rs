/// Task status definitions and the legal transition table
///
/// Every status change of a task goes through [`TaskStatus::transition`], so
/// an illegal move is rejected before anything is written to storage.
use crate::MarkdocError;
use std::fmt;

/// Represents the lifecycle status of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Active States =====
    /// Task has been created but never started
    Pending,

    /// A runner is (or should be) driving the task
    Running,

    /// Task was paused by the user; the frontier is the checkpoint
    Paused,

    // ===== Terminal States =====
    /// Frontier drained with no fetch in flight
    Completed,

    /// Systemic error, partial results retained
    Failed,

    /// Cancelled by the user, partial results retained
    Cancelled,
}

impl TaskStatus {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task may be edited (configuration, recrawl)
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Pending | Self::Paused)
    }

    /// Checks a transition against the state table
    ///
    /// # Legal transitions
    ///
    /// | From | To |
    /// |------|----|
    /// | Pending | Running, Cancelled |
    /// | Running | Paused, Completed, Failed, Cancelled |
    /// | Paused | Running, Cancelled |
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
                | (Paused, Cancelled)
        )
    }

    /// Validates a transition, returning the target status on success
    ///
    /// # Returns
    ///
    /// * `Ok(TaskStatus)` - The new status
    /// * `Err(MarkdocError::InvalidTransition)` - The move is not in the table
    pub fn transition(self, to: TaskStatus) -> Result<TaskStatus, MarkdocError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(MarkdocError::InvalidTransition { from: self, to })
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible task statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Paused,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

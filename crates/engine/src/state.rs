//! Per-node run-state tracking.

use serde::{Deserialize, Serialize};

/// The run-state of a single node within one flow execution.
///
/// States are owned by the executor and move monotonically toward exactly
/// one terminal value; terminal writes go through a per-node check-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not yet eligible; waiting for predecessors (or for a retry slot).
    Pending,
    /// Submitted to the worker pool and executing.
    Running,
    /// Finished successfully.
    Success,
    /// Failed after exhausting its retry budget.
    Failed,
    /// Excluded by a branch decision or an unmet trigger rule.
    Skipped,
    /// Interrupted by run cancellation.
    Cancelled,
    /// Can never run because its upstream outcome contradicts its rule.
    UpstreamFailed,
}

impl TaskState {
    /// Returns `true` if the node has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns `true` if the node counts as resolved for trigger-rule
    /// evaluation (alias of [`TaskState::is_terminal`], named for the
    /// predecessor-set reading).
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.is_terminal()
    }

    /// Returns `true` if the node failed or inherited an upstream failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::UpstreamFailed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

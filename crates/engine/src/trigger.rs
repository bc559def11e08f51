//! Trigger rules: when may a node run, given its direct predecessors.

use serde::{Deserialize, Serialize};

use crate::state::TaskState;

/// Policy deciding, from the states of a node's **direct** predecessors,
/// whether the node may fire.
///
/// Eager rules can fire before every predecessor has resolved; blocking
/// rules return `false` until no predecessor is `Pending`/`Running`. When a
/// blocking rule's predecessor set is fully resolved and the rule still
/// evaluates false, the node can never fire and must be assigned the
/// terminal state from [`TriggerRule::mismatch_outcome`] without running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    /// (default) Every predecessor succeeded.
    #[default]
    AllSuccess,
    /// Every predecessor failed or upstream-failed.
    AllFailed,
    /// Every predecessor resolved, in whatever state.
    AllDone,
    /// Every predecessor was skipped.
    AllSkipped,
    /// Eager: any predecessor failed or upstream-failed.
    OneFailed,
    /// Eager: any predecessor succeeded.
    OneSuccess,
    /// Eager: any predecessor reached a conclusive state (success, failed,
    /// or upstream-failed); skips alone never fire it.
    OneDone,
    /// Every predecessor resolved and none failed.
    NoneFailed,
    /// Every predecessor resolved, none failed, at least one succeeded.
    NoneFailedMinOneSuccess,
    /// Every predecessor resolved and none was skipped.
    NoneSkipped,
    /// Fires unconditionally as soon as the run starts.
    Always,
}

impl TriggerRule {
    /// Returns `true` if this rule can fire before all predecessors resolve.
    #[must_use]
    pub fn is_eager(&self) -> bool {
        matches!(
            self,
            Self::OneSuccess | Self::OneFailed | Self::OneDone | Self::Always
        )
    }

    /// Evaluate the rule against the current direct-predecessor state set.
    ///
    /// Returns `true` when the node may run now. `false` means "not yet" for
    /// an unresolved predecessor set and "never" once the set is fully
    /// resolved; the executor distinguishes the two via the dynamic
    /// in-degree and routes the latter to [`TriggerRule::mismatch_outcome`].
    #[must_use]
    pub fn evaluate(&self, upstream: &[TaskState]) -> bool {
        let all_resolved = upstream.iter().all(TaskState::is_resolved);

        match self {
            // Eager rules fire the moment one conclusive state lands.
            Self::OneSuccess => upstream.iter().any(|s| *s == TaskState::Success),
            Self::OneFailed => upstream.iter().any(TaskState::is_failure),
            Self::OneDone => upstream
                .iter()
                .any(|s| *s == TaskState::Success || s.is_failure()),
            Self::Always => true,

            // Positive blocking rules: an unresolved member fails the
            // all-match, so these are safe without an explicit gate.
            Self::AllSuccess => upstream.iter().all(|s| *s == TaskState::Success),
            Self::AllFailed => upstream.iter().all(TaskState::is_failure),
            Self::AllSkipped => upstream.iter().all(|s| *s == TaskState::Skipped),
            Self::AllDone => all_resolved,

            // Negative blocking rules need the gate: "none failed so far"
            // says nothing while predecessors are still running.
            Self::NoneFailed => all_resolved && !upstream.iter().any(TaskState::is_failure),
            Self::NoneSkipped => {
                all_resolved && !upstream.iter().any(|s| *s == TaskState::Skipped)
            }
            Self::NoneFailedMinOneSuccess => {
                all_resolved
                    && !upstream.iter().any(TaskState::is_failure)
                    && upstream.iter().any(|s| *s == TaskState::Success)
            }
        }
    }

    /// Terminal state and reason for a node whose predecessor set is fully
    /// resolved but whose rule evaluates false.
    #[must_use]
    pub fn mismatch_outcome(&self) -> (TaskState, String) {
        match self {
            Self::AllSuccess => (
                TaskState::UpstreamFailed,
                "upstream failed or skipped".to_owned(),
            ),
            Self::AllFailed => (TaskState::Skipped, "some upstream succeeded".to_owned()),
            rule => (
                TaskState::UpstreamFailed,
                format!("trigger rule {rule:?} not satisfied after all upstreams finished"),
            ),
        }
    }
}

impl std::fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AllSuccess => "all_success",
            Self::AllFailed => "all_failed",
            Self::AllDone => "all_done",
            Self::AllSkipped => "all_skipped",
            Self::OneFailed => "one_failed",
            Self::OneSuccess => "one_success",
            Self::OneDone => "one_done",
            Self::NoneFailed => "none_failed",
            Self::NoneFailedMinOneSuccess => "none_failed_min_one_success",
            Self::NoneSkipped => "none_skipped",
            Self::Always => "always",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskState::*;

    #[test]
    fn default_is_all_success() {
        assert_eq!(TriggerRule::default(), TriggerRule::AllSuccess);
    }

    #[test]
    fn all_success() {
        let rule = TriggerRule::AllSuccess;
        assert!(rule.evaluate(&[Success, Success]));
        assert!(!rule.evaluate(&[Success, Running]));
        assert!(!rule.evaluate(&[Success, Failed]));
        assert!(!rule.evaluate(&[Success, Skipped]));
        // No predecessors: vacuously true.
        assert!(rule.evaluate(&[]));
    }

    #[test]
    fn all_failed() {
        let rule = TriggerRule::AllFailed;
        assert!(rule.evaluate(&[Failed, UpstreamFailed]));
        assert!(!rule.evaluate(&[Failed, Pending]));
        assert!(!rule.evaluate(&[Failed, Success]));
        assert!(!rule.evaluate(&[Failed, Skipped]));
    }

    #[test]
    fn all_skipped() {
        let rule = TriggerRule::AllSkipped;
        assert!(rule.evaluate(&[Skipped, Skipped]));
        assert!(!rule.evaluate(&[Skipped, Success]));
        assert!(!rule.evaluate(&[Skipped, Running]));
    }

    #[test]
    fn all_done_requires_full_resolution_only() {
        let rule = TriggerRule::AllDone;
        assert!(rule.evaluate(&[Success, Failed, Skipped, UpstreamFailed, Cancelled]));
        assert!(!rule.evaluate(&[Success, Running]));
        assert!(!rule.evaluate(&[Success, Pending]));
    }

    #[test]
    fn one_success_fires_eagerly() {
        let rule = TriggerRule::OneSuccess;
        assert!(rule.evaluate(&[Success, Running]));
        assert!(rule.evaluate(&[Success, Pending]));
        assert!(!rule.evaluate(&[Running, Pending]));
        assert!(!rule.evaluate(&[Failed, Skipped]));
    }

    #[test]
    fn one_failed_fires_eagerly() {
        let rule = TriggerRule::OneFailed;
        assert!(rule.evaluate(&[Failed, Running]));
        assert!(rule.evaluate(&[UpstreamFailed, Pending]));
        assert!(!rule.evaluate(&[Success, Running]));
    }

    #[test]
    fn one_done_ignores_skips() {
        let rule = TriggerRule::OneDone;
        assert!(rule.evaluate(&[Success, Pending]));
        assert!(rule.evaluate(&[Failed, Pending]));
        assert!(rule.evaluate(&[UpstreamFailed, Pending]));
        assert!(!rule.evaluate(&[Skipped, Pending]));
        // A skipped-only resolved set never fires one_done.
        assert!(!rule.evaluate(&[Skipped, Skipped]));
    }

    #[test]
    fn always_fires_unconditionally() {
        let rule = TriggerRule::Always;
        assert!(rule.evaluate(&[]));
        assert!(rule.evaluate(&[Pending, Running]));
        assert!(rule.evaluate(&[Failed]));
    }

    #[test]
    fn none_failed_waits_for_full_resolution() {
        let rule = TriggerRule::NoneFailed;
        assert!(!rule.evaluate(&[Success, Running]));
        assert!(rule.evaluate(&[Success, Skipped]));
        assert!(!rule.evaluate(&[Success, Failed]));
        assert!(!rule.evaluate(&[Success, UpstreamFailed]));
    }

    #[test]
    fn none_skipped_waits_for_full_resolution() {
        let rule = TriggerRule::NoneSkipped;
        assert!(!rule.evaluate(&[Success, Pending]));
        assert!(rule.evaluate(&[Success, Failed, UpstreamFailed]));
        assert!(!rule.evaluate(&[Success, Skipped]));
    }

    #[test]
    fn none_failed_min_one_success() {
        let rule = TriggerRule::NoneFailedMinOneSuccess;
        assert!(!rule.evaluate(&[Success, Running]));
        assert!(rule.evaluate(&[Success, Skipped]));
        assert!(!rule.evaluate(&[Skipped, Skipped]));
        assert!(!rule.evaluate(&[Success, Failed]));
    }

    #[test]
    fn eager_classification() {
        assert!(TriggerRule::OneSuccess.is_eager());
        assert!(TriggerRule::OneFailed.is_eager());
        assert!(TriggerRule::OneDone.is_eager());
        assert!(TriggerRule::Always.is_eager());
        assert!(!TriggerRule::AllSuccess.is_eager());
        assert!(!TriggerRule::NoneFailed.is_eager());
    }

    #[test]
    fn mismatch_outcomes() {
        assert_eq!(
            TriggerRule::AllSuccess.mismatch_outcome().0,
            UpstreamFailed
        );
        assert_eq!(TriggerRule::AllFailed.mismatch_outcome().0, Skipped);
        assert_eq!(TriggerRule::OneSuccess.mismatch_outcome().0, UpstreamFailed);
        assert_eq!(TriggerRule::NoneSkipped.mismatch_outcome().0, UpstreamFailed);
    }

    #[test]
    fn display_names() {
        assert_eq!(TriggerRule::AllSuccess.to_string(), "all_success");
        assert_eq!(
            TriggerRule::NoneFailedMinOneSuccess.to_string(),
            "none_failed_min_one_success"
        );
    }
}

//! The node behavior trait and its retry policy.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::inputs::NodeInputs;
use crate::result::NodeResult;
use crate::trigger::TriggerRule;

/// How a node's failures are retried before it goes terminally `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first run included.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fixed-delay policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart.
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(1000))
    }
}

/// A unit of executable behavior bound to one graph node.
///
/// Implementations are shared (`Arc`) between the control loop and worker
/// tasks, so `call` takes `&self`; per-invocation state belongs in the
/// [`ExecutionContext`] or in the returned [`NodeResult`].
#[async_trait]
pub trait TaskNode: Send + Sync {
    /// The graph node id this behavior is bound to.
    fn id(&self) -> &str;

    /// The registered type name this behavior was built from.
    fn node_type(&self) -> &str;

    /// When this node may fire relative to its predecessors.
    fn trigger_rule(&self) -> TriggerRule {
        TriggerRule::AllSuccess
    }

    /// Retry budget for recoverable failures.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Entry-point nodes receive the flow input on their default input port.
    fn is_start(&self) -> bool {
        false
    }

    /// Run the node.
    ///
    /// An `Err` and an `Ok` carrying `success: false` are treated alike:
    /// both consume a retry attempt and, once the budget is exhausted,
    /// resolve the node to `Failed`.
    async fn call(&self, ctx: &ExecutionContext, inputs: NodeInputs) -> anyhow::Result<NodeResult>;
}

//! Run lifecycle observation.

use crate::result::{FlowResult, NodeResult};
use crate::state::TaskState;

/// Observer of a run's lifecycle.
///
/// Callbacks fire on the executor's control loop; keep them short. All
/// methods default to no-ops so implementations override only what they
/// watch. A panicking listener is isolated and logged, never aborts the run.
pub trait ExecutionListener: Send + Sync {
    /// The run is about to schedule its first nodes.
    fn on_flow_start(&self, run_id: &str) {
        let _ = run_id;
    }

    /// A node reached a terminal state.
    fn on_node_completed(&self, node_id: &str, state: TaskState, result: &NodeResult) {
        let _ = (node_id, state, result);
    }

    /// The run finished, successfully or not.
    fn on_flow_completed(&self, result: &FlowResult) {
        let _ = result;
    }

    /// Reserved for pause/resume support.
    fn on_flow_paused(&self, run_id: &str) {
        let _ = run_id;
    }
}

/// Listener that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}

/// Invoke a listener callback, isolating panics.
pub(crate) fn notify<L, F>(listener: &L, hook: &str, f: F)
where
    L: ExecutionListener + ?Sized,
    F: FnOnce(&L),
{
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(listener)));
    if outcome.is_err() {
        tracing::error!(hook, "execution listener panicked");
    }
}

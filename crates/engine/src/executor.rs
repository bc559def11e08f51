//! The completion-ordered flow executor.
//!
//! One control loop owns all scheduling state and is the only writer of node
//! states. Workers run on a semaphore-bounded tokio pool and report back over
//! an mpsc channel; retries are timers that post back into the same channel.
//! Nothing outside the loop mutates the run, so trigger-rule evaluation always
//! sees a consistent predecessor snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cascade_graph::Graph;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::inputs::NodeInputs;
use crate::listener::{ExecutionListener, NoopListener, notify};
use crate::node::TaskNode;
use crate::registry::NodeRegistry;
use crate::result::{FlowResult, NodeOutput, NodeResult};
use crate::state::TaskState;
use crate::trigger::TriggerRule;

/// Lifecycle of one executor instance. An executor drives exactly one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Constructed, not yet run.
    Idle,
    /// The control loop is live.
    Running,
    /// The run reached exhaustion.
    Completed,
    /// The run was cancelled before exhaustion.
    Cancelled,
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Every spawned task posts exactly one message back to the control loop,
/// which is what the in-flight accounting counts.
enum LoopMsg {
    Finished {
        node_id: String,
        attempt: u32,
        outcome: anyhow::Result<NodeResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    RetryDue {
        node_id: String,
        attempt: u32,
    },
    Cancelled {
        node_id: String,
    },
}

/// Drives runs of a workflow graph.
///
/// Construction resolves every graph node through the registry, so unknown
/// node types are rejected before anything executes. A completed executor
/// can run again (each run gets fresh per-run state); a second `run` while
/// one is live fails, and a cancelled executor is terminal because the
/// cancellation token is shared across runs.
pub struct FlowExecutor {
    graph: Arc<Graph>,
    nodes: HashMap<String, Arc<dyn TaskNode>>,
    listener: Arc<dyn ExecutionListener>,
    cancel: CancellationToken,
    state: Mutex<ExecutionState>,
    concurrency: Option<usize>,
    poll_interval: Duration,
}

impl FlowExecutor {
    /// Build an executor over an analyzed graph.
    ///
    /// Fails if the graph is cyclic or any node names an unregistered type.
    pub fn new(graph: Graph, registry: &NodeRegistry) -> Result<Self, EngineError> {
        graph.initialize()?;
        let mut nodes = HashMap::with_capacity(graph.nodes().len());
        for graph_node in graph.nodes() {
            nodes.insert(graph_node.id.clone(), registry.build(graph_node)?);
        }
        Ok(Self {
            graph: Arc::new(graph),
            nodes,
            listener: Arc::new(NoopListener),
            cancel: CancellationToken::new(),
            state: Mutex::new(ExecutionState::Idle),
            concurrency: None,
            poll_interval: Duration::from_millis(250),
        })
    }

    /// Attach a lifecycle listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Override the worker pool size.
    #[must_use]
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers.max(1));
        self
    }

    /// Override how often the control loop wakes without a completion.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        *self.state.lock()
    }

    /// A token that cancels the run when triggered; clones share the run.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation. In-flight nodes are interrupted, unreached
    /// nodes resolve to `Cancelled`, and `run` returns after the pool drains.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn pool_size(&self, max_parallelism: usize) -> usize {
        if let Some(workers) = self.concurrency {
            return workers;
        }
        let cores = std::thread::available_parallelism().map_or(1, usize::from);
        max_parallelism.min(cores).max(1)
    }

    /// Run the flow to exhaustion (or cancellation) and aggregate the outcome.
    pub async fn run(&self, flow_input: Value) -> Result<FlowResult, EngineError> {
        {
            let mut state = self.state.lock();
            match *state {
                ExecutionState::Idle | ExecutionState::Completed => {
                    *state = ExecutionState::Running;
                }
                other => return Err(EngineError::InvalidState(other)),
            }
        }

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let ctx = Arc::new(ExecutionContext::new(flow_input));
        notify(self.listener.as_ref(), "on_flow_start", |l| {
            l.on_flow_start(&run_id);
        });

        if self.nodes.is_empty() {
            warn!(%run_id, "flow has no nodes, nothing to execute");
            let result = self.finalize(&run_id, started_at, &HashMap::new(), &ctx);
            *self.state.lock() = ExecutionState::Completed;
            notify(self.listener.as_ref(), "on_flow_completed", |l| {
                l.on_flow_completed(&result);
            });
            return Ok(result);
        }

        let max_parallelism = self.graph.max_parallelism()?;
        let pool_size = self.pool_size(max_parallelism);
        info!(
            %run_id,
            nodes = self.nodes.len(),
            max_parallelism,
            pool_size,
            "starting flow"
        );

        let mut run = RunLoop {
            graph: &self.graph,
            nodes: &self.nodes,
            listener: self.listener.as_ref(),
            cancel: &self.cancel,
            ctx: &ctx,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            states: self
                .nodes
                .keys()
                .map(|id| (id.clone(), TaskState::Pending))
                .collect(),
            inflight: 0,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        run.seed(&tx)?;

        while run.inflight > 0 {
            match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                Ok(Some(msg)) => run.handle(msg, &tx)?,
                // Every spawned task holds a sender, so the channel cannot
                // close while inflight > 0.
                Ok(None) => break,
                Err(_elapsed) => {
                    trace!(inflight = run.inflight, "control loop heartbeat");
                }
            }
        }

        let states = run.states;
        let result = self.finalize(&run_id, started_at, &states, &ctx);
        let final_state = if self.cancel.is_cancelled() {
            ExecutionState::Cancelled
        } else {
            ExecutionState::Completed
        };
        *self.state.lock() = final_state;
        info!(
            %run_id,
            success = result.success,
            succeeded = result.succeeded.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "flow finished"
        );
        notify(self.listener.as_ref(), "on_flow_completed", |l| {
            l.on_flow_completed(&result);
        });
        Ok(result)
    }

    fn finalize(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        states: &HashMap<String, TaskState>,
        ctx: &ExecutionContext,
    ) -> FlowResult {
        let mut succeeded = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = HashMap::new();
        for (node_id, state) in states {
            match state {
                TaskState::Success => succeeded.push(node_id.clone()),
                TaskState::Skipped | TaskState::UpstreamFailed => skipped.push(node_id.clone()),
                TaskState::Failed | TaskState::Cancelled => {
                    let reason = ctx
                        .result_of(node_id)
                        .map(|r| r.reason().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "flow cancelled".to_owned());
                    failed.insert(node_id.clone(), reason);
                }
                // A node never submitted when a cancelled run drained is
                // dropped without a terminal state; anything else left
                // unresolved is a scheduling hole worth flagging.
                TaskState::Pending | TaskState::Running => {
                    if self.cancel.is_cancelled() {
                        debug!(run_id, %node_id, "node never started, dropped");
                    } else {
                        warn!(run_id, %node_id, %state, "node left unresolved");
                        failed.insert(node_id.clone(), "never resolved".to_owned());
                    }
                }
            }
        }
        succeeded.sort();
        skipped.sort();
        FlowResult {
            run_id: run_id.to_owned(),
            success: failed.is_empty(),
            succeeded,
            skipped,
            failed,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("nodes", &self.nodes.len())
            .field("state", &self.execution_state())
            .finish_non_exhaustive()
    }
}

type LoopSender = mpsc::UnboundedSender<LoopMsg>;

/// Loop-local scheduling state. Lives only inside [`FlowExecutor::run`].
struct RunLoop<'a> {
    graph: &'a Graph,
    nodes: &'a HashMap<String, Arc<dyn TaskNode>>,
    listener: &'a dyn ExecutionListener,
    cancel: &'a CancellationToken,
    ctx: &'a Arc<ExecutionContext>,
    semaphore: Arc<Semaphore>,
    states: HashMap<String, TaskState>,
    /// Outstanding messages: one per live worker or pending retry timer.
    inflight: usize,
}

impl RunLoop<'_> {
    /// Submit roots (in-degree zero) and `always`-rule nodes.
    fn seed(&mut self, tx: &LoopSender) -> Result<(), EngineError> {
        let in_degree = self.graph.in_degree()?.clone();
        let mut seeds: Vec<String> = Vec::new();
        for (node_id, node) in self.nodes {
            let rootless = in_degree.get(node_id).is_none_or(|d| *d == 0);
            if rootless || node.trigger_rule() == TriggerRule::Always {
                seeds.push(node_id.clone());
            }
        }
        seeds.sort();
        for node_id in seeds {
            self.submit(&node_id, 1, tx)?;
        }
        Ok(())
    }

    fn handle(&mut self, msg: LoopMsg, tx: &LoopSender) -> Result<(), EngineError> {
        self.inflight -= 1;
        match msg {
            LoopMsg::Finished {
                node_id,
                attempt,
                outcome,
                started_at,
                finished_at,
            } => {
                let result = match outcome {
                    Ok(result) => result,
                    Err(error) => NodeResult::failed(format!("{error:#}")),
                };
                let result = result
                    .with_node_id(&node_id)
                    .with_timing(started_at, finished_at);
                if result.success {
                    self.complete(&node_id, result, tx)
                } else {
                    self.fail(&node_id, attempt, result, tx)
                }
            }
            LoopMsg::RetryDue { node_id, attempt } => {
                if self.cancel.is_cancelled() {
                    self.resolve(
                        &node_id,
                        TaskState::Cancelled,
                        "cancelled before retry".to_owned(),
                        tx,
                    )
                } else {
                    self.submit(&node_id, attempt, tx)
                }
            }
            LoopMsg::Cancelled { node_id } => self.resolve(
                &node_id,
                TaskState::Cancelled,
                "flow cancelled".to_owned(),
                tx,
            ),
        }
    }

    /// Move a pending node to `Running` and spawn its worker.
    fn submit(&mut self, node_id: &str, attempt: u32, tx: &LoopSender) -> Result<(), EngineError> {
        match self.states.get(node_id) {
            Some(TaskState::Pending) => {}
            // Already submitted or resolved through another path.
            _ => return Ok(()),
        }
        let Some(node) = self.nodes.get(node_id) else {
            return Ok(());
        };
        self.set_state(node_id, TaskState::Running);
        debug!(node_id, attempt, "submitting node");

        let inputs = self.materialize_inputs(node_id, node.as_ref())?;
        let node = Arc::clone(node);
        let ctx = Arc::clone(self.ctx);
        let cancel = self.cancel.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let tx = tx.clone();
        let node_id = node_id.to_owned();
        self.inflight += 1;
        tokio::spawn(async move {
            let msg = tokio::select! {
                _ = cancel.cancelled() => LoopMsg::Cancelled { node_id },
                permit = semaphore.acquire_owned() => match permit {
                    Ok(_permit) => {
                        let started_at = Utc::now();
                        tokio::select! {
                            _ = cancel.cancelled() => LoopMsg::Cancelled { node_id },
                            outcome = node.call(&ctx, inputs) => LoopMsg::Finished {
                                node_id,
                                attempt,
                                outcome,
                                started_at,
                                finished_at: Utc::now(),
                            },
                        }
                    }
                    Err(_closed) => LoopMsg::Cancelled { node_id },
                },
            };
            let _ = tx.send(msg);
        });
        Ok(())
    }

    /// Gather successful upstream outputs along the node's input wiring.
    /// Start nodes additionally receive the flow input on the default port.
    fn materialize_inputs(
        &self,
        node_id: &str,
        node: &dyn TaskNode,
    ) -> Result<NodeInputs, EngineError> {
        let mut inputs = NodeInputs::new();
        if node.is_start() {
            inputs.push(
                cascade_graph::DEFAULT_INPUT_PORT,
                NodeOutput::new(self.ctx.flow_input().clone()),
            );
        }
        for binding in self.graph.input_wiring_of(node_id)? {
            if let Some(result) = self.ctx.result_of(&binding.source_node) {
                if !result.success {
                    continue;
                }
                if let Some(output) = result.output(&binding.source_port) {
                    inputs.push(binding.target_port.clone(), output.clone());
                }
            }
        }
        Ok(inputs)
    }

    /// A node finished successfully: record, notify, activate dependents.
    fn complete(
        &mut self,
        node_id: &str,
        result: NodeResult,
        tx: &LoopSender,
    ) -> Result<(), EngineError> {
        let branch = result.next_nodes().cloned();
        self.ctx.record_result(result.clone());
        self.set_state(node_id, TaskState::Success);
        debug!(node_id, "node succeeded");
        notify(self.listener, "on_node_completed", |l| {
            l.on_node_completed(node_id, TaskState::Success, &result);
        });

        let dependents: Vec<String> = self
            .graph
            .downstream_of(node_id)?
            .iter()
            .cloned()
            .collect();
        for dependent in dependents {
            if let Some(branch) = &branch {
                if !branch.contains(&dependent) {
                    // Branch decision: non-members are skipped outright, no
                    // trigger rule consulted.
                    self.resolve(
                        &dependent,
                        TaskState::Skipped,
                        format!("not selected by branch node '{node_id}'"),
                        tx,
                    )?;
                    continue;
                }
            }
            self.evaluate_dependent(&dependent, tx)?;
        }
        Ok(())
    }

    /// A node attempt failed: retry if budget remains, else resolve `Failed`.
    fn fail(
        &mut self,
        node_id: &str,
        attempt: u32,
        result: NodeResult,
        tx: &LoopSender,
    ) -> Result<(), EngineError> {
        let Some(node) = self.nodes.get(node_id) else {
            return Ok(());
        };
        let policy = node.retry_policy();
        if attempt < policy.max_attempts && !self.cancel.is_cancelled() {
            warn!(
                node_id,
                attempt,
                max_attempts = policy.max_attempts,
                reason = result.reason(),
                "node failed, scheduling retry"
            );
            // Back to Pending so the retry submission passes the guard.
            self.set_state(node_id, TaskState::Pending);
            let tx = tx.clone();
            let node_id = node_id.to_owned();
            let delay = policy.delay;
            self.inflight += 1;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(LoopMsg::RetryDue {
                    node_id,
                    attempt: attempt + 1,
                });
            });
            return Ok(());
        }

        warn!(
            node_id,
            attempt,
            reason = result.reason(),
            "node failed terminally"
        );
        self.ctx.record_result(result.clone());
        self.set_state(node_id, TaskState::Failed);
        notify(self.listener, "on_node_completed", |l| {
            l.on_node_completed(node_id, TaskState::Failed, &result);
        });
        let dependents: Vec<String> = self
            .graph
            .downstream_of(node_id)?
            .iter()
            .cloned()
            .collect();
        for dependent in dependents {
            self.evaluate_dependent(&dependent, tx)?;
        }
        Ok(())
    }

    /// Assign a terminal state without running the node, then walk dependents
    /// iteratively. Downstream of a skip, rules still apply (an `all_skipped`
    /// dependent fires, an `all_success` one cascades to `upstream_failed`).
    fn resolve(
        &mut self,
        node_id: &str,
        terminal: TaskState,
        reason: String,
        tx: &LoopSender,
    ) -> Result<(), EngineError> {
        let mut queue: VecDeque<(String, TaskState, String)> = VecDeque::new();
        queue.push_back((node_id.to_owned(), terminal, reason));

        while let Some((node_id, terminal, reason)) = queue.pop_front() {
            match self.states.get(&node_id) {
                Some(TaskState::Pending) => {}
                // Cancellation messages may arrive for a node the loop
                // already resolved; terminal states are first-write-wins.
                Some(state) if state.is_terminal() => continue,
                _ if terminal == TaskState::Cancelled => {}
                _ => continue,
            }
            debug!(%node_id, state = %terminal, %reason, "resolving node without running");
            let result = if terminal == TaskState::Cancelled {
                NodeResult::failed(reason)
            } else {
                NodeResult::skipped(reason)
            }
            .with_node_id(&node_id);
            self.ctx.record_result(result.clone());
            self.set_state(&node_id, terminal);
            notify(self.listener, "on_node_completed", |l| {
                l.on_node_completed(&node_id, terminal, &result);
            });

            // Cancellation does not propagate: unreached dependents stay
            // Pending and are dropped by finalize, not resolved terminally.
            if terminal == TaskState::Cancelled {
                continue;
            }

            let dependents: Vec<String> = self
                .graph
                .downstream_of(&node_id)?
                .iter()
                .cloned()
                .collect();
            for dependent in dependents {
                if let Some((terminal, reason)) = self.dependent_disposition(&dependent, tx)? {
                    queue.push_back((dependent, terminal, reason));
                }
            }
        }
        Ok(())
    }

    /// Re-check one dependent after an upstream resolution; submit it when
    /// its rule fires, resolve it terminally when the rule can never fire.
    fn evaluate_dependent(&mut self, node_id: &str, tx: &LoopSender) -> Result<(), EngineError> {
        if let Some((terminal, reason)) = self.dependent_disposition(node_id, tx)? {
            self.resolve(node_id, terminal, reason, tx)?;
        }
        Ok(())
    }

    /// Shared rule check. Submits the node when its rule fires. Returns the
    /// terminal disposition when the rule is conclusively unsatisfied, `None`
    /// when the node was submitted, already handled, or must keep waiting.
    fn dependent_disposition(
        &mut self,
        node_id: &str,
        tx: &LoopSender,
    ) -> Result<Option<(TaskState, String)>, EngineError> {
        match self.states.get(node_id) {
            Some(TaskState::Pending) => {}
            _ => return Ok(None),
        }
        let Some(node) = self.nodes.get(node_id) else {
            return Ok(None);
        };
        let rule = node.trigger_rule();
        let upstream: Vec<TaskState> = self
            .graph
            .upstream_of(node_id)?
            .iter()
            .map(|id| {
                self.states
                    .get(id)
                    .copied()
                    .unwrap_or(TaskState::Pending)
            })
            .collect();

        if rule.evaluate(&upstream) {
            self.submit(node_id, 1, tx)?;
            return Ok(None);
        }
        if upstream.iter().all(TaskState::is_resolved) {
            return Ok(Some(rule.mismatch_outcome()));
        }
        Ok(None)
    }

    fn set_state(&mut self, node_id: &str, state: TaskState) {
        self.states.insert(node_id.to_owned(), state);
        self.ctx.record_state(node_id, state);
    }
}

//! The `start` built-in.

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::inputs::NodeInputs;
use crate::node::{RetryPolicy, TaskNode};
use crate::result::NodeResult;

/// Entry-point node: republishes the flow input on its default output port
/// so downstream nodes can wire against it.
#[derive(Debug, Clone)]
pub struct StartNode {
    id: String,
}

impl StartNode {
    /// Bind a start node to a graph node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl TaskNode for StartNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        "start"
    }

    fn is_start(&self) -> bool {
        true
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    async fn call(
        &self,
        ctx: &ExecutionContext,
        inputs: NodeInputs,
    ) -> anyhow::Result<NodeResult> {
        // The executor delivers the flow input on the default input port;
        // fall back to the context for direct invocations.
        let payload = inputs
            .first_payload(cascade_graph::DEFAULT_INPUT_PORT)
            .cloned()
            .unwrap_or_else(|| ctx.flow_input().clone());
        Ok(NodeResult::success().with_output(cascade_graph::DEFAULT_OUTPUT_PORT, payload))
    }
}

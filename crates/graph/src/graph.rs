//! The DAG and its frozen topology.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::edge::GraphEdge;
use crate::error::GraphError;
use crate::node::GraphNode;

/// One resolved input dependency of a target node: which upstream node feeds
/// which of the target's input ports, from which of its output ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputBinding {
    /// Upstream node producing the value.
    pub source_node: String,
    /// Output port on the upstream node.
    pub source_port: String,
    /// Input port on the target node.
    pub target_port: String,
}

/// Everything derived from the node/edge lists by [`Graph::initialize`].
///
/// Adjacency sets are ordered (`BTreeSet`) so traversal order is stable
/// across runs, which keeps scheduling behavior reproducible in tests.
#[derive(Debug)]
struct Topology {
    adjacency: HashMap<String, BTreeSet<String>>,
    reverse_adjacency: HashMap<String, BTreeSet<String>>,
    input_wiring: HashMap<String, BTreeSet<InputBinding>>,
    in_degree: HashMap<String, usize>,
    levels: Vec<Vec<String>>,
    max_parallelism: usize,
}

/// An immutable-after-initialization DAG of workflow nodes.
///
/// Built from node/edge collections (invalid entries are dropped at build
/// time), then frozen by [`Graph::initialize`], which derives adjacency,
/// input wiring, per-node in-degree, and the maximum parallelism, and fails
/// if the graph contains a cycle. All topology queries lazily initialize.
#[derive(Debug, Serialize, Deserialize)]
#[serde(from = "GraphWire")]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    #[serde(skip)]
    topology: OnceLock<Result<Topology, GraphError>>,
}

/// Wire shape accepted when deserializing a graph; routed through
/// [`Graph::new`] so build-time filtering applies to deserialized input too.
#[derive(Deserialize)]
struct GraphWire {
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    edges: Vec<GraphEdge>,
}

impl From<GraphWire> for Graph {
    fn from(wire: GraphWire) -> Self {
        Self::new(wire.nodes, wire.edges)
    }
}

impl Graph {
    /// Build a graph, silently dropping nodes without a usable id (keeping
    /// the first occurrence of a duplicated id) and edges missing an id or
    /// an endpoint reference.
    #[must_use]
    pub fn new(
        nodes: impl IntoIterator<Item = GraphNode>,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<GraphNode> = nodes
            .into_iter()
            .filter(|n| n.is_valid() && seen.insert(n.id.clone()))
            .collect();
        let edges: Vec<GraphEdge> = edges.into_iter().filter(GraphEdge::is_valid).collect();
        Self {
            nodes,
            edges,
            topology: OnceLock::new(),
        }
    }

    /// The retained nodes.
    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// The retained edges.
    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Replace the node list. Rejected once the topology is frozen.
    pub fn set_nodes(&mut self, nodes: impl IntoIterator<Item = GraphNode>) -> Result<(), GraphError> {
        if self.topology.get().is_some() {
            return Err(GraphError::AlreadyInitialized);
        }
        let mut seen = HashSet::new();
        self.nodes = nodes
            .into_iter()
            .filter(|n| n.is_valid() && seen.insert(n.id.clone()))
            .collect();
        Ok(())
    }

    /// Replace the edge list. Rejected once the topology is frozen.
    pub fn set_edges(&mut self, edges: impl IntoIterator<Item = GraphEdge>) -> Result<(), GraphError> {
        if self.topology.get().is_some() {
            return Err(GraphError::AlreadyInitialized);
        }
        self.edges = edges.into_iter().filter(GraphEdge::is_valid).collect();
        Ok(())
    }

    /// Run the topology analysis, freezing the graph.
    ///
    /// Idempotent and safe to call concurrently; only the first caller does
    /// any work. Fails with [`GraphError::CycleDetected`] if the graph is
    /// not acyclic.
    pub fn initialize(&self) -> Result<(), GraphError> {
        self.topology().map(|_| ())
    }

    fn topology(&self) -> Result<&Topology, GraphError> {
        self.topology
            .get_or_init(|| self.analyze())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn analyze(&self) -> Result<Topology, GraphError> {
        let mut adjacency: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut reverse_adjacency: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut input_wiring: HashMap<String, BTreeSet<InputBinding>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();

        for node in &self.nodes {
            adjacency.entry(node.id.clone()).or_default();
            reverse_adjacency.entry(node.id.clone()).or_default();
            in_degree.insert(node.id.clone(), 0);
        }

        for edge in &self.edges {
            // An edge with a missing endpoint is dropped, not an error.
            if !in_degree.contains_key(&edge.source) || !in_degree.contains_key(&edge.target) {
                continue;
            }
            let new_dependency = adjacency
                .get_mut(&edge.source)
                .is_some_and(|set| set.insert(edge.target.clone()));
            if let Some(upstreams) = reverse_adjacency.get_mut(&edge.target) {
                upstreams.insert(edge.source.clone());
            }

            // In-degree counts distinct upstream nodes, not edges: parallel
            // edges wiring several ports between the same pair add one.
            if new_dependency {
                if let Some(degree) = in_degree.get_mut(&edge.target) {
                    *degree += 1;
                }
            }

            input_wiring
                .entry(edge.target.clone())
                .or_default()
                .insert(InputBinding {
                    source_node: edge.source.clone(),
                    source_port: edge.source_port.clone(),
                    target_port: edge.target_port.clone(),
                });
        }

        Self::check_acyclic(&adjacency)?;

        let levels = Self::layer(&adjacency, &in_degree);
        let max_parallelism = levels.iter().map(Vec::len).max().unwrap_or(0).max(1);

        Ok(Topology {
            adjacency,
            reverse_adjacency,
            input_wiring,
            in_degree,
            levels,
            max_parallelism,
        })
    }

    fn check_acyclic(adjacency: &HashMap<String, BTreeSet<String>>) -> Result<(), GraphError> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index_map: HashMap<&str, NodeIndex> = HashMap::new();
        for id in adjacency.keys() {
            index_map.insert(id, graph.add_node(id));
        }
        for (source, targets) in adjacency {
            for target in targets {
                graph.add_edge(index_map[source.as_str()], index_map[target.as_str()], ());
            }
        }
        if is_cyclic_directed(&graph) {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }

    /// Kahn layering; each layer holds the nodes that become ready together,
    /// so the widest layer is the graph's maximum parallelism.
    fn layer(
        adjacency: &HashMap<String, BTreeSet<String>>,
        in_degree: &HashMap<String, usize>,
    ) -> Vec<Vec<String>> {
        let mut remaining: HashMap<&str, usize> =
            in_degree.iter().map(|(id, d)| (id.as_str(), *d)).collect();
        let mut current: Vec<String> = {
            let mut roots: Vec<String> = remaining
                .iter()
                .filter(|(_, d)| **d == 0)
                .map(|(id, _)| (*id).to_owned())
                .collect();
            roots.sort();
            roots
        };

        let mut levels = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for dependent in &adjacency[id.as_str()] {
                    let degree = remaining.get_mut(dependent.as_str()).expect("known node");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
            next.sort();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels
    }

    /// Direct dependents of a node.
    pub fn downstream_of(&self, node_id: &str) -> Result<&BTreeSet<String>, GraphError> {
        static EMPTY: OnceLock<BTreeSet<String>> = OnceLock::new();
        Ok(self
            .topology()?
            .adjacency
            .get(node_id)
            .unwrap_or_else(|| EMPTY.get_or_init(BTreeSet::new)))
    }

    /// Direct predecessors of a node.
    pub fn upstream_of(&self, node_id: &str) -> Result<&BTreeSet<String>, GraphError> {
        static EMPTY: OnceLock<BTreeSet<String>> = OnceLock::new();
        Ok(self
            .topology()?
            .reverse_adjacency
            .get(node_id)
            .unwrap_or_else(|| EMPTY.get_or_init(BTreeSet::new)))
    }

    /// The deduplicated input wiring of a node: every
    /// `(source node, source port, target port)` triple feeding it.
    pub fn input_wiring_of(&self, node_id: &str) -> Result<&BTreeSet<InputBinding>, GraphError> {
        static EMPTY: OnceLock<BTreeSet<InputBinding>> = OnceLock::new();
        Ok(self
            .topology()?
            .input_wiring
            .get(node_id)
            .unwrap_or_else(|| EMPTY.get_or_init(BTreeSet::new)))
    }

    /// The original in-degree of every node (distinct upstream nodes).
    pub fn in_degree(&self) -> Result<&HashMap<String, usize>, GraphError> {
        Ok(&self.topology()?.in_degree)
    }

    /// The Kahn layers of the DAG; nodes within one layer can run together.
    pub fn levels(&self) -> Result<&[Vec<String>], GraphError> {
        Ok(&self.topology()?.levels)
    }

    /// Width of the widest Kahn layer (floor 1).
    pub fn max_parallelism(&self) -> Result<usize, GraphError> {
        Ok(self.topology()?.max_parallelism)
    }

    /// Returns `true` if the node has no dependents.
    pub fn is_leaf(&self, node_id: &str) -> Result<bool, GraphError> {
        Ok(self.downstream_of(node_id)?.is_empty())
    }

    /// Returns `true` if the node has neither dependents nor predecessors.
    pub fn is_isolated(&self, node_id: &str) -> Result<bool, GraphError> {
        Ok(self.downstream_of(node_id)?.is_empty() && self.upstream_of(node_id)?.is_empty())
    }

    /// All isolated nodes, in node-list order.
    pub fn isolated_nodes(&self) -> Result<Vec<&str>, GraphError> {
        let mut isolated = Vec::new();
        for node in &self.nodes {
            if self.is_isolated(&node.id)? {
                isolated.push(node.id.as_str());
            }
        }
        Ok(isolated)
    }

    /// Extract the ancestor subgraph of `target_id`: every node from which
    /// the target is reachable, found by reverse BFS, plus the edges between
    /// them. With `include_target` false the target itself and the edges
    /// terminating at it are left out.
    ///
    /// Returns `None` if the target does not exist, or if excluding it would
    /// leave nothing (edgeless graph). The returned graph is fresh and
    /// uninitialized, so it can be extended before its own analysis. Used
    /// for partial/backfill execution of a graph prefix.
    pub fn subgraph_reaching(
        &self,
        target_id: &str,
        include_target: bool,
    ) -> Result<Option<Graph>, GraphError> {
        if target_id.is_empty() || self.node(target_id).is_none() {
            return Ok(None);
        }

        if self.edges.is_empty() {
            if !include_target {
                return Ok(None);
            }
            let target = self.node(target_id).expect("checked above").clone();
            return Ok(Some(Graph::new([target], [])));
        }

        let topology = self.topology()?;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([target_id]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(upstreams) = topology.reverse_adjacency.get(id) {
                queue.extend(upstreams.iter().map(String::as_str).filter(|u| !visited.contains(u)));
            }
        }

        let sub_nodes: Vec<GraphNode> = self
            .nodes
            .iter()
            .filter(|n| visited.contains(n.id.as_str()))
            .filter(|n| include_target || n.id != target_id)
            .cloned()
            .collect();
        let sub_edges: Vec<GraphEdge> = self
            .edges
            .iter()
            .filter(|e| visited.contains(e.source.as_str()) && visited.contains(e.target.as_str()))
            .filter(|e| include_target || e.target != target_id)
            .cloned()
            .collect();

        Ok(Some(Graph::new(sub_nodes, sub_edges)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(id: &str) -> GraphNode {
        GraphNode::new(id, "task")
    }

    fn edge(id: &str, source: &str, target: &str) -> GraphEdge {
        GraphEdge::new(id, source, target)
    }

    /// A -> C, B -> C, C -> D.
    fn join_graph() -> Graph {
        Graph::new(
            [node("a"), node("b"), node("c"), node("d")],
            [edge("e1", "a", "c"), edge("e2", "b", "c"), edge("e3", "c", "d")],
        )
    }

    #[test]
    fn build_filters_invalid_nodes_and_edges() {
        let graph = Graph::new(
            [node("a"), node(""), node("  "), node("a")],
            [edge("e1", "a", "b"), edge("", "a", "b"), edge("e2", "", "b")],
        );
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn edge_with_missing_endpoint_dropped_silently() {
        let graph = Graph::new([node("a"), node("b")], [edge("e1", "a", "b"), edge("e2", "a", "ghost")]);
        graph.initialize().unwrap();
        assert_eq!(graph.downstream_of("a").unwrap().len(), 1);
        assert_eq!(*graph.in_degree().unwrap().get("b").unwrap(), 1);
    }

    #[test]
    fn adjacency_and_reverse_adjacency() {
        let graph = join_graph();
        assert_eq!(
            graph.downstream_of("a").unwrap().iter().collect::<Vec<_>>(),
            vec!["c"]
        );
        assert_eq!(
            graph.upstream_of("c").unwrap().iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(graph.downstream_of("d").unwrap().is_empty());
        assert!(graph.upstream_of("ghost").unwrap().is_empty());
    }

    #[test]
    fn in_degree_counts_distinct_upstreams_not_edges() {
        // Two port wirings a -> b plus one c -> b: in-degree of b is 2.
        let graph = Graph::new(
            [node("a"), node("b"), node("c")],
            [
                edge("e1", "a", "b").with_ports("out0", "in0"),
                edge("e2", "a", "b").with_ports("out1", "in1"),
                edge("e3", "c", "b"),
            ],
        );
        assert_eq!(*graph.in_degree().unwrap().get("b").unwrap(), 2);
        // But the wiring keeps all three bindings.
        assert_eq!(graph.input_wiring_of("b").unwrap().len(), 3);
    }

    #[test]
    fn duplicate_wiring_triples_are_deduplicated() {
        let graph = Graph::new(
            [node("a"), node("b")],
            [edge("e1", "a", "b"), edge("e2", "a", "b")],
        );
        assert_eq!(graph.input_wiring_of("b").unwrap().len(), 1);
        assert_eq!(*graph.in_degree().unwrap().get("b").unwrap(), 1);
    }

    #[test]
    fn max_parallelism_is_widest_kahn_layer() {
        let graph = join_graph();
        assert_eq!(graph.max_parallelism().unwrap(), 2);
        let levels = graph.levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(levels[1], vec!["c".to_owned()]);
        assert_eq!(levels[2], vec!["d".to_owned()]);
    }

    #[test]
    fn max_parallelism_floor_is_one() {
        let graph = Graph::new([], []);
        assert_eq!(graph.max_parallelism().unwrap(), 1);
    }

    #[test]
    fn cycle_fails_initialization() {
        let graph = Graph::new(
            [node("a"), node("b")],
            [edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        assert_eq!(graph.initialize(), Err(GraphError::CycleDetected));
        // The failure is sticky: queries keep reporting it.
        assert_eq!(graph.max_parallelism(), Err(GraphError::CycleDetected));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = Graph::new([node("a")], [edge("e1", "a", "a")]);
        assert_eq!(graph.initialize(), Err(GraphError::CycleDetected));
    }

    #[test]
    fn initialize_is_idempotent() {
        let graph = join_graph();
        graph.initialize().unwrap();
        graph.initialize().unwrap();
        assert_eq!(graph.max_parallelism().unwrap(), 2);
    }

    #[test]
    fn initialize_is_thread_safe() {
        let graph = std::sync::Arc::new(join_graph());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let graph = graph.clone();
                std::thread::spawn(move || graph.initialize())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn mutation_after_initialize_rejected() {
        let mut graph = join_graph();
        graph.initialize().unwrap();
        assert_eq!(graph.set_nodes([node("x")]), Err(GraphError::AlreadyInitialized));
        assert_eq!(graph.set_edges([]), Err(GraphError::AlreadyInitialized));
    }

    #[test]
    fn mutation_before_initialize_allowed() {
        let mut graph = join_graph();
        graph.set_edges([edge("e1", "a", "b")]).unwrap();
        graph.initialize().unwrap();
        assert_eq!(*graph.in_degree().unwrap().get("b").unwrap(), 1);
    }

    #[test]
    fn queries_lazily_initialize() {
        let graph = join_graph();
        // No explicit initialize() call.
        assert_eq!(graph.upstream_of("d").unwrap().len(), 1);
    }

    #[test]
    fn leaf_and_isolated_queries() {
        let graph = Graph::new(
            [node("a"), node("b"), node("lone")],
            [edge("e1", "a", "b")],
        );
        assert!(graph.is_leaf("b").unwrap());
        assert!(!graph.is_leaf("a").unwrap());
        assert!(graph.is_isolated("lone").unwrap());
        assert_eq!(graph.isolated_nodes().unwrap(), vec!["lone"]);
    }

    #[test]
    fn subgraph_reaching_collects_all_ancestors() {
        // a -> c, b -> c, c -> d, x -> y (unrelated branch)
        let graph = Graph::new(
            [node("a"), node("b"), node("c"), node("d"), node("x"), node("y")],
            [
                edge("e1", "a", "c"),
                edge("e2", "b", "c"),
                edge("e3", "c", "d"),
                edge("e4", "x", "y"),
            ],
        );
        let sub = graph.subgraph_reaching("d", true).unwrap().unwrap();
        let mut ids: Vec<&str> = sub.nodes().iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(sub.edges().len(), 3);
    }

    #[test]
    fn subgraph_reaching_can_exclude_target() {
        let graph = join_graph();
        let sub = graph.subgraph_reaching("c", false).unwrap().unwrap();
        let mut ids: Vec<&str> = sub.nodes().iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(sub.edges().is_empty());
    }

    #[test]
    fn subgraph_reaching_unknown_target() {
        let graph = join_graph();
        assert!(graph.subgraph_reaching("ghost", true).unwrap().is_none());
        assert!(graph.subgraph_reaching("", true).unwrap().is_none());
    }

    #[test]
    fn subgraph_of_edgeless_graph() {
        let graph = Graph::new([node("a")], []);
        let sub = graph.subgraph_reaching("a", true).unwrap().unwrap();
        assert_eq!(sub.nodes().len(), 1);
        assert!(graph.subgraph_reaching("a", false).unwrap().is_none());
    }

    #[test]
    fn subgraph_is_executable_independently() {
        let graph = join_graph();
        let sub = graph.subgraph_reaching("c", true).unwrap().unwrap();
        sub.initialize().unwrap();
        assert_eq!(sub.max_parallelism().unwrap(), 2);
        assert_eq!(*sub.in_degree().unwrap().get("c").unwrap(), 2);
    }

    #[test]
    fn deserialize_applies_build_filtering() {
        let graph: Graph = serde_json::from_value(serde_json::json!({
            "nodes": [
                { "id": "a", "type": "start" },
                { "id": "", "type": "task" },
                { "id": "b", "type": "output" }
            ],
            "edges": [
                { "id": "e1", "source": "a", "target": "b" },
                { "id": "", "source": "a", "target": "b" }
            ]
        }))
        .unwrap();
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.edges().len(), 1);
        graph.initialize().unwrap();
    }
}

//! Workflow graph: an arena of `WorkflowNode`s plus directed edges.
//!
//! Structure is fixed at construction. The `GraphExecutor` walks the graph
//! from its single trigger node and is the only thing that mutates node
//! state during a run.

pub mod executor;
pub mod node;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::types::{NodeKind, NodeStatus};

pub use executor::{ExecutionRecord, GraphExecutor};
pub use node::{NodeState, OutputFormat, Position, WorkflowNode};

/// A directed edge between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Declarative node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDescriptor {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub toggle: Option<String>,
    #[serde(default)]
    pub position: Position,
}

/// Declarative graph configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphDescriptor {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<Edge>,
}

/// Node and edge data for a graph renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visualization {
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub position: Position,
    pub status: NodeStatus,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    id: String,
    name: String,
    nodes: Vec<WorkflowNode>,
    index: HashMap<String, usize>,
    /// (from, to) node indices, in declaration order.
    edges: Vec<(usize, usize)>,
}

impl WorkflowGraph {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> Result<()> {
        if self.index.contains_key(&node.id) {
            return Err(AdbrainError::InvalidGraph(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn connect(&mut self, from: &str, to: &str) -> Result<()> {
        let from = self.index_of(from)?;
        let to = self.index_of(to)?;
        self.edges.push((from, to));
        Ok(())
    }

    pub fn node(&self, id: &str) -> Result<&WorkflowNode> {
        Ok(&self.nodes[self.index_of(id)?])
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|&(from, to)| Edge::new(&self.nodes[from].id, &self.nodes[to].id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes with no incoming edge.
    pub fn trigger_nodes(&self) -> Result<Vec<&WorkflowNode>> {
        let triggers: Vec<_> = self
            .trigger_indices()
            .into_iter()
            .map(|i| &self.nodes[i])
            .collect();
        if triggers.is_empty() {
            return Err(AdbrainError::InvalidGraph(format!(
                "graph '{}' has no trigger node",
                self.id
            )));
        }
        Ok(triggers)
    }

    /// Successors of `id`, in edge declaration order.
    pub fn successors(&self, id: &str) -> Result<Vec<&WorkflowNode>> {
        let idx = self.index_of(id)?;
        Ok(self
            .successor_indices(idx)
            .into_iter()
            .map(|i| &self.nodes[i])
            .collect())
    }

    pub fn predecessors(&self, id: &str) -> Result<Vec<&WorkflowNode>> {
        let idx = self.index_of(id)?;
        Ok(self
            .predecessor_indices(idx)
            .into_iter()
            .map(|i| &self.nodes[i])
            .collect())
    }

    /// Exactly one trigger, and it is of kind `trigger`.
    pub fn validate(&self) -> Result<()> {
        let triggers = self.trigger_nodes()?;
        if triggers.len() != 1 {
            let ids: Vec<_> = triggers.iter().map(|n| n.id.as_str()).collect();
            return Err(AdbrainError::InvalidGraph(format!(
                "expected exactly one trigger node, found {}: {}",
                ids.len(),
                ids.join(", ")
            )));
        }
        let trigger = triggers[0];
        if trigger.kind != NodeKind::Trigger {
            return Err(AdbrainError::InvalidGraph(format!(
                "entry node '{}' is a {}, not a trigger",
                trigger.id, trigger.kind
            )));
        }
        Ok(())
    }

    /// Put every node back to idle.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }

    pub fn from_descriptor(descriptor: &GraphDescriptor) -> Result<Self> {
        let mut graph = Self::new(&descriptor.id, &descriptor.name);
        for nd in &descriptor.nodes {
            let mut node = WorkflowNode::new(&nd.id, nd.kind, &nd.label)
                .with_format(nd.output_format)
                .with_position(nd.position.x, nd.position.y);
            node.function = nd.function.clone();
            node.toggle = nd.toggle.clone();
            graph.add_node(node)?;
        }
        for edge in &descriptor.edges {
            graph.connect(&edge.from, &edge.to)?;
        }
        Ok(graph)
    }

    pub fn descriptor(&self) -> GraphDescriptor {
        GraphDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeDescriptor {
                    id: n.id.clone(),
                    kind: n.kind,
                    label: n.label.clone(),
                    function: n.function.clone(),
                    output_format: n.output_format,
                    toggle: n.toggle.clone(),
                    position: n.position,
                })
                .collect(),
            edges: self.edges(),
        }
    }

    pub fn visualization(&self) -> Visualization {
        Visualization {
            nodes: self
                .nodes
                .iter()
                .map(|n| VisualNode {
                    id: n.id.clone(),
                    label: n.label.clone(),
                    kind: n.kind,
                    position: n.position,
                    status: n.status,
                    duration_secs: n.duration_secs,
                })
                .collect(),
            edges: self.edges(),
        }
    }

    pub fn node_states(&self) -> Vec<NodeState> {
        self.nodes.iter().map(WorkflowNode::state).collect()
    }

    // ── Index-level access for the executor ─────────────────────

    fn index_of(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| AdbrainError::UnknownNode(id.to_string()))
    }

    pub(crate) fn trigger_indices(&self) -> Vec<usize> {
        let mut has_incoming = vec![false; self.nodes.len()];
        for &(_, to) in &self.edges {
            has_incoming[to] = true;
        }
        (0..self.nodes.len()).filter(|&i| !has_incoming[i]).collect()
    }

    pub(crate) fn successor_indices(&self, idx: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|&&(from, _)| from == idx)
            .map(|&(_, to)| to)
            .collect()
    }

    pub(crate) fn predecessor_indices(&self, idx: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|&&(_, to)| to == idx)
            .map(|&(from, _)| from)
            .collect()
    }

    pub(crate) fn node_at(&self, idx: usize) -> &WorkflowNode {
        &self.nodes[idx]
    }

    pub(crate) fn node_at_mut(&mut self, idx: usize) -> &mut WorkflowNode {
        &mut self.nodes[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> WorkflowGraph {
        let mut g = WorkflowGraph::new("diamond", "Diamond");
        g.add_node(WorkflowNode::trigger("start", "Start")).unwrap();
        g.add_node(WorkflowNode::aggregator("left", "Left", "f")).unwrap();
        g.add_node(WorkflowNode::aggregator("right", "Right", "f")).unwrap();
        g.add_node(WorkflowNode::aggregator("join", "Join", "f")).unwrap();
        g.connect("start", "left").unwrap();
        g.connect("start", "right").unwrap();
        g.connect("left", "join").unwrap();
        g.connect("right", "join").unwrap();
        g
    }

    #[test]
    fn test_single_trigger() {
        let g = diamond();
        let triggers = g.trigger_nodes().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].id, "start");
        g.validate().unwrap();
    }

    #[test]
    fn test_no_trigger_is_invalid() {
        let mut g = WorkflowGraph::new("loop", "Loop");
        g.add_node(WorkflowNode::aggregator("a", "A", "f")).unwrap();
        g.add_node(WorkflowNode::aggregator("b", "B", "f")).unwrap();
        g.connect("a", "b").unwrap();
        g.connect("b", "a").unwrap();

        let err = g.trigger_nodes().unwrap_err();
        assert!(matches!(err, AdbrainError::InvalidGraph(_)));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_two_triggers_fail_validation() {
        let mut g = diamond();
        g.add_node(WorkflowNode::trigger("second", "Second")).unwrap();
        g.connect("second", "join").unwrap();
        assert_eq!(g.trigger_nodes().unwrap().len(), 2);
        assert!(matches!(g.validate(), Err(AdbrainError::InvalidGraph(_))));
    }

    #[test]
    fn test_entry_must_be_trigger_kind() {
        let mut g = WorkflowGraph::new("g", "G");
        g.add_node(WorkflowNode::aggregator("a", "A", "f")).unwrap();
        assert!(matches!(g.validate(), Err(AdbrainError::InvalidGraph(_))));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut g = diamond();
        let err = g.add_node(WorkflowNode::trigger("start", "Again")).unwrap_err();
        assert!(matches!(err, AdbrainError::InvalidGraph(_)));
    }

    #[test]
    fn test_connect_unknown_node() {
        let mut g = diamond();
        let err = g.connect("start", "nowhere").unwrap_err();
        assert!(matches!(err, AdbrainError::UnknownNode(id) if id == "nowhere"));
    }

    #[test]
    fn test_successors_in_declaration_order() {
        let g = diamond();
        let succ: Vec<_> = g.successors("start").unwrap().iter().map(|n| n.id.clone()).collect();
        assert_eq!(succ, vec!["left", "right"]);

        let preds: Vec<_> = g.predecessors("join").unwrap().iter().map(|n| n.id.clone()).collect();
        assert_eq!(preds, vec!["left", "right"]);

        assert!(g.successors("missing").is_err());
    }

    #[test]
    fn test_descriptor_round_trip() {
        let g = diamond();
        let descriptor = g.descriptor();
        let rebuilt = WorkflowGraph::from_descriptor(&descriptor).unwrap();
        assert_eq!(rebuilt.descriptor(), descriptor);
        assert_eq!(rebuilt.edges().len(), 4);
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = serde_json::json!({
            "id": "mini",
            "name": "Mini",
            "nodes": [
                {"id": "t", "kind": "trigger", "label": "T"},
                {"id": "g", "kind": "generator", "label": "G", "function": "p", "output_format": "json"}
            ],
            "edges": [{"from": "t", "to": "g"}]
        });
        let descriptor: GraphDescriptor = serde_json::from_value(json).unwrap();
        let g = WorkflowGraph::from_descriptor(&descriptor).unwrap();
        assert_eq!(g.node("g").unwrap().output_format, OutputFormat::Json);
        g.validate().unwrap();
    }

    #[test]
    fn test_visualization() {
        let viz = diamond().visualization();
        assert_eq!(viz.nodes.len(), 4);
        assert_eq!(viz.edges[0], Edge::new("start", "left"));
        assert!(viz.nodes.iter().all(|n| n.status == NodeStatus::Idle));
    }
}

//! COA graph arena
//!
//! Nodes live in a vector and are referenced by index; edges reference
//! nodes by ID and are resolved once when the graph is frozen. All derived
//! relations (predecessors, exception-join flows, the Outcome bound to an
//! OutcomeFilter) are index lists computed at build time.
//!
//! # Critical Invariants
//!
//! 1. Node IDs are unique and every edge endpoint exists
//! 2. The graph is append-only while building and structurally frozen
//!    afterwards; only node runtime state changes during a run
//! 3. Disabled and executed nodes are never roots

use crate::coa::edge::{CoaEdge, EdgeKind};
use crate::coa::node::{CoaNode, NodeKind, NodeSpec};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or driving a COA graph
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoaError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge {from} -> {to} references unknown node {missing}")]
    UnknownEndpoint {
        from: String,
        to: String,
        missing: String,
    },

    #[error("Edge {from} -> {to} has probability {probability} outside [0, 1]")]
    InvalidProbability {
        from: String,
        to: String,
        probability: f64,
    },

    #[error("Exception join into {to} names unknown flow {flow}")]
    UnknownFlow { to: String, flow: String },

    #[error("Invalid node {id}: {reason}")]
    InvalidNode { id: String, reason: String },

    #[error("Outcome filter {0} has no registered filter")]
    MissingFilter(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

/// Incrementally assembles a graph, validating as it goes
#[derive(Debug, Default)]
pub struct CoaGraphBuilder {
    nodes: Vec<NodeSpec>,
    index: HashMap<String, usize>,
    edges: Vec<CoaEdge>,
}

impl CoaGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> Result<(), CoaError> {
        if self.index.contains_key(&spec.id) {
            return Err(CoaError::DuplicateNode(spec.id));
        }
        validate_kind(&spec)?;
        self.index.insert(spec.id.clone(), self.nodes.len());
        self.nodes.push(spec);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: CoaEdge) -> Result<(), CoaError> {
        for endpoint in [&edge.from, &edge.to] {
            if !self.index.contains_key(endpoint) {
                return Err(CoaError::UnknownEndpoint {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        match &edge.kind {
            EdgeKind::FlowWithProbability { probability }
                if !(0.0..=1.0).contains(probability) =>
            {
                return Err(CoaError::InvalidProbability {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    probability: *probability,
                });
            }
            EdgeKind::ExceptionJoin { flows } if flows.is_empty() => {
                return Err(CoaError::InvalidNode {
                    id: edge.to.clone(),
                    reason: "exception join lists no flows".to_string(),
                });
            }
            _ => {}
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Freeze the graph and derive its relations
    pub fn build(self) -> Result<CoaGraph, CoaError> {
        let count = self.nodes.len();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut join_flows: Vec<Vec<String>> = vec![Vec::new(); count];
        let mut flow_targets: HashMap<String, Vec<usize>> = HashMap::new();

        for edge in &self.edges {
            let from = self.index[&edge.from];
            let to = self.index[&edge.to];
            if let Some(flow) = &edge.flow_id {
                let targets = flow_targets.entry(flow.clone()).or_default();
                if !targets.contains(&to) {
                    targets.push(to);
                }
            }
            match &edge.kind {
                EdgeKind::ExceptionJoin { flows } => {
                    for flow in flows {
                        if !join_flows[to].contains(flow) {
                            join_flows[to].push(flow.clone());
                        }
                    }
                }
                EdgeKind::Flow | EdgeKind::FlowWithProbability { .. } => {
                    if !preds[to].contains(&from) {
                        preds[to].push(from);
                    }
                }
            }
        }

        for (idx, flows) in join_flows.iter().enumerate() {
            if let Some(flow) = flows.iter().find(|f| !flow_targets.contains_key(*f)) {
                return Err(CoaError::UnknownFlow {
                    to: self.nodes[idx].id.clone(),
                    flow: flow.clone(),
                });
            }
        }

        for (idx, spec) in self.nodes.iter().enumerate() {
            if let Some(required) = spec.kind.required_branches() {
                if required > preds[idx].len() {
                    return Err(CoaError::InvalidNode {
                        id: spec.id.clone(),
                        reason: format!(
                            "requires {} branches but has {} predecessors",
                            required,
                            preds[idx].len()
                        ),
                    });
                }
            }
        }

        let bound_outcome = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, spec)| match spec.kind {
                NodeKind::OutcomeFilter => preds[idx]
                    .iter()
                    .copied()
                    .find(|p| matches!(self.nodes[*p].kind, NodeKind::Outcome { .. })),
                _ => None,
            })
            .collect();

        Ok(CoaGraph {
            nodes: self.nodes.into_iter().map(CoaNode::from_spec).collect(),
            index: self.index,
            edges: self.edges,
            preds,
            join_flows,
            flow_targets,
            bound_outcome,
        })
    }
}

fn validate_kind(spec: &NodeSpec) -> Result<(), CoaError> {
    let invalid = |reason: String| CoaError::InvalidNode {
        id: spec.id.clone(),
        reason,
    };
    match &spec.kind {
        NodeKind::Duration { length } if !length.is_finite() || *length < 0.0 => {
            Err(invalid(format!("duration length {length} must be finite and non-negative")))
        }
        NodeKind::RandomDuration {
            lower_bound,
            upper_bound,
        } => {
            if !lower_bound.is_finite() || !upper_bound.is_finite() || *lower_bound < 0.0 {
                Err(invalid("random duration bounds must be finite and non-negative".to_string()))
            } else if lower_bound > upper_bound {
                Err(invalid(format!(
                    "lower bound {lower_bound} exceeds upper bound {upper_bound}"
                )))
            } else {
                Ok(())
            }
        }
        NodeKind::SyncPoint { target_time, .. } if !target_time.is_finite() => {
            Err(invalid("sync point target time must be finite".to_string()))
        }
        NodeKind::Action { class, .. } | NodeKind::Outcome { class } if class.trim().is_empty() => {
            Err(invalid("interaction class must not be empty".to_string()))
        }
        _ => Ok(()),
    }
}

/// Frozen workflow graph with per-node runtime state
#[derive(Debug, Clone, Default)]
pub struct CoaGraph {
    nodes: Vec<CoaNode>,
    index: HashMap<String, usize>,
    edges: Vec<CoaEdge>,
    preds: Vec<Vec<usize>>,
    join_flows: Vec<Vec<String>>,
    flow_targets: HashMap<String, Vec<usize>>,
    bound_outcome: Vec<Option<usize>>,
}

impl CoaGraph {
    pub fn builder() -> CoaGraphBuilder {
        CoaGraphBuilder::new()
    }

    /// Build a graph from complete node and edge lists
    pub fn from_parts(
        nodes: impl IntoIterator<Item = NodeSpec>,
        edges: impl IntoIterator<Item = CoaEdge>,
    ) -> Result<Self, CoaError> {
        let mut builder = CoaGraphBuilder::new();
        for node in nodes {
            builder.add_node(node)?;
        }
        for edge in edges {
            builder.add_edge(edge)?;
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> &[CoaEdge] {
        &self.edges
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CoaNode> {
        self.nodes.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&CoaNode> {
        self.index_of(id).map(|idx| &self.nodes[idx])
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut CoaNode> {
        let idx = self.index_of(id)?;
        Some(&mut self.nodes[idx])
    }

    pub(crate) fn at(&self, idx: usize) -> &CoaNode {
        &self.nodes[idx]
    }

    pub(crate) fn at_mut(&mut self, idx: usize) -> &mut CoaNode {
        &mut self.nodes[idx]
    }

    /// IDs of the structural predecessors of `id`
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.index_of(id)
            .map(|idx| {
                self.preds[idx]
                    .iter()
                    .map(|p| self.nodes[*p].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outcome node an OutcomeFilter reads from
    pub fn bound_outcome(&self, idx: usize) -> Option<usize> {
        self.bound_outcome.get(idx).copied().flatten()
    }

    /// Whether the node at `idx` may be visited this pass
    pub fn is_root(&self, idx: usize) -> bool {
        let node = &self.nodes[idx];
        if node.disabled || node.is_executed() {
            return false;
        }

        if !self.join_flows[idx].is_empty() {
            return self.join_flows[idx].iter().all(|flow| {
                self.flow_targets
                    .get(flow)
                    .map(|targets| targets.iter().any(|t| self.nodes[*t].is_executed()))
                    .unwrap_or(false)
            });
        }

        let preds = &self.preds[idx];
        let finished = preds
            .iter()
            .filter(|p| self.nodes[**p].is_executed())
            .count();
        match node.kind.required_branches() {
            Some(required) if required > 0 => finished >= required,
            _ => finished == preds.len(),
        }
    }

    /// Indices of every current root
    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len()).filter(|idx| self.is_root(*idx)).collect()
    }

    pub fn executed_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_executed()).count()
    }

    /// IDs of nodes that were disabled at load
    pub fn disabled_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.disabled)
            .map(|n| n.id.as_str())
            .collect()
    }
}

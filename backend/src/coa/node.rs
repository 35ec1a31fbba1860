//! COA workflow nodes

use crate::models::interaction::{ArrivedInteraction, ClassHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Type-specific node configuration
///
/// Tagged by `type` in scenario files:
///
/// ```json
/// { "id": "wait", "type": "duration", "length": 2.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Fires once simulated time reaches `target_time`
    ///
    /// Becomes a root once `required_branches` predecessors executed
    /// (0 = all of them).
    SyncPoint {
        target_time: f64,
        #[serde(default)]
        required_branches: usize,
    },

    /// Joins parallel branches; fires once `required_branches` predecessors
    /// executed (0 = all of them)
    AwaitN {
        #[serde(default)]
        required_branches: usize,
    },

    /// Fixed-length timer started on first visit
    Duration { length: f64 },

    /// Timer whose length is drawn from U(lower_bound, upper_bound) on start
    RandomDuration { lower_bound: f64, upper_bound: f64 },

    Fork {
        #[serde(default)]
        decision_point: bool,
    },

    ProbabilisticChoice {
        #[serde(default)]
        decision_point: bool,
    },

    /// Sends an interaction
    Action {
        class: String,
        #[serde(default)]
        parameters: BTreeMap<String, Value>,
    },

    /// Waits for an interaction of `class` arriving after the node started
    /// waiting
    Outcome { class: String },

    /// Applies a registered filter to the preceding Outcome's observation
    OutcomeFilter,
}

impl NodeKind {
    /// Stable name used in logs and events
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::SyncPoint { .. } => "sync_point",
            NodeKind::AwaitN { .. } => "await_n",
            NodeKind::Duration { .. } => "duration",
            NodeKind::RandomDuration { .. } => "random_duration",
            NodeKind::Fork { .. } => "fork",
            NodeKind::ProbabilisticChoice { .. } => "probabilistic_choice",
            NodeKind::Action { .. } => "action",
            NodeKind::Outcome { .. } => "outcome",
            NodeKind::OutcomeFilter => "outcome_filter",
        }
    }

    /// Interaction class the node sends or waits for
    pub fn interaction_class(&self) -> Option<&str> {
        match self {
            NodeKind::Action { class, .. } | NodeKind::Outcome { class } => Some(class),
            _ => None,
        }
    }

    /// Join threshold for branch-counting nodes
    pub fn required_branches(&self) -> Option<usize> {
        match self {
            NodeKind::SyncPoint {
                required_branches, ..
            }
            | NodeKind::AwaitN { required_branches } => Some(*required_branches),
            _ => None,
        }
    }
}

/// Node as it appears in the scenario descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotExecuted,
    Executed,
}

/// Started timer of a Duration or RandomDuration node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTimer {
    pub start: f64,
    pub length: f64,
}

impl NodeTimer {
    pub fn elapsed(&self, now: f64) -> bool {
        now >= self.start + self.length
    }
}

/// Runtime node held in the graph arena
#[derive(Debug, Clone)]
pub struct CoaNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub status: NodeStatus,
    /// Simulated time the node was marked executed
    pub completed_at: Option<f64>,
    pub timer: Option<NodeTimer>,
    /// Outcome: time the node began waiting
    pub await_start: Option<f64>,
    /// Outcome: interaction that satisfied (or last satisfied) the wait
    pub observed: Option<ArrivedInteraction>,
    pub class_handle: Option<ClassHandle>,
    /// Disabled nodes never become roots
    pub disabled: bool,
}

impl CoaNode {
    pub(crate) fn from_spec(spec: NodeSpec) -> Self {
        Self {
            name: if spec.name.is_empty() {
                spec.id.clone()
            } else {
                spec.name
            },
            id: spec.id,
            kind: spec.kind,
            status: NodeStatus::NotExecuted,
            completed_at: None,
            timer: None,
            await_start: None,
            observed: None,
            class_handle: None,
            disabled: false,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == NodeStatus::Executed
    }

    pub(crate) fn mark_executed(&mut self, now: f64) {
        self.status = NodeStatus::Executed;
        self.completed_at = Some(now);
    }
}

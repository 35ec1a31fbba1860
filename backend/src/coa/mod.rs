//! Course of Action (COA) workflow
//!
//! A COA is a graph of timer, join, decision, action and outcome nodes
//! loaded once from the scenario and advanced one pass per federation step.

pub mod edge;
pub mod executor;
pub mod filter;
pub mod graph;
pub mod node;

pub use edge::{CoaEdge, EdgeKind};
pub use executor::{ClassBinding, CoaEffect, CoaExecutor, CoaPass, ExecutedNode};
pub use filter::{FilterRegistry, OutcomeFilterFn};
pub use graph::{CoaError, CoaGraph, CoaGraphBuilder};
pub use node::{CoaNode, NodeKind, NodeSpec, NodeStatus, NodeTimer};

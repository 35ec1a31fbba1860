//! COA workflow execution
//!
//! One call to [`CoaExecutor::advance`] is one pass: visit every root,
//! apply its firing rule, and repeat while anything fired so newly
//! unlocked nodes run in the same simulated instant. The repetition is an
//! iterative fixpoint bounded by the node count. When the pass settles the
//! correlator is cleared, whether or not any Outcome consumed its records.
//!
//! The executor never talks to the bus. Interactions to send and
//! termination requests come back as [`CoaEffect`]s for the caller to
//! carry out under the federation lock.

use crate::coa::filter::FilterRegistry;
use crate::coa::graph::{CoaError, CoaGraph};
use crate::coa::node::{CoaNode, NodeKind, NodeTimer};
use crate::models::correlator::InteractionCorrelator;
use crate::models::interaction::{ClassHandle, Interaction};
use crate::rng::RngManager;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Side effect requested by a fired node
#[derive(Debug, Clone, PartialEq)]
pub enum CoaEffect {
    /// Send the interaction built by an Action node
    Send {
        node_id: String,
        interaction: Interaction,
    },
    /// An Action node targeted the end-of-simulation class
    Terminate { node_id: String },
}

/// A node that fired during a pass
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedNode {
    pub node_id: String,
    pub kind: &'static str,
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoaPass {
    pub executed: Vec<ExecutedNode>,
    pub effects: Vec<CoaEffect>,
    /// No node was eligible when the pass settled
    pub exhausted: bool,
}

/// Interaction class a node needs registered before the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBinding {
    pub node_id: String,
    pub class: String,
    /// Action nodes publish, Outcome nodes subscribe
    pub publish: bool,
}

/// Drives a [`CoaGraph`] forward in simulated time
///
/// # Example
/// ```
/// use federation_manager_core_rs::coa::{CoaExecutor, CoaGraph, FilterRegistry, NodeKind, NodeSpec};
/// use federation_manager_core_rs::models::InteractionCorrelator;
/// use federation_manager_core_rs::RngManager;
///
/// let graph = CoaGraph::from_parts(
///     vec![NodeSpec::new("wait", NodeKind::Duration { length: 2.0 })],
///     vec![],
/// )
/// .unwrap();
/// let mut executor = CoaExecutor::new(graph, FilterRegistry::new()).unwrap();
/// let mut correlator = InteractionCorrelator::new();
/// let mut rng = RngManager::new(7);
///
/// // First visit only starts the timer
/// assert!(executor.advance(0.0, &mut correlator, &mut rng).executed.is_empty());
/// assert!(executor.advance(1.0, &mut correlator, &mut rng).executed.is_empty());
/// assert_eq!(executor.advance(2.0, &mut correlator, &mut rng).executed.len(), 1);
/// ```
#[derive(Debug)]
pub struct CoaExecutor {
    graph: CoaGraph,
    filters: FilterRegistry,
    end_class: Option<String>,
}

impl CoaExecutor {
    /// Wrap a frozen graph, checking every OutcomeFilter has a predicate
    pub fn new(graph: CoaGraph, filters: FilterRegistry) -> Result<Self, CoaError> {
        if let Some(missing) = graph
            .nodes()
            .find(|node| matches!(node.kind, NodeKind::OutcomeFilter) && !filters.contains(&node.id))
        {
            return Err(CoaError::MissingFilter(missing.id.clone()));
        }
        Ok(Self {
            graph,
            filters,
            end_class: None,
        })
    }

    /// Action nodes sending this class request termination instead
    pub fn with_end_class(mut self, class: impl Into<String>) -> Self {
        self.end_class = Some(class.into());
        self
    }

    pub fn graph(&self) -> &CoaGraph {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&CoaNode> {
        self.graph.node(id)
    }

    /// Classes that Action and Outcome nodes need resolved
    pub fn class_bindings(&self) -> Vec<ClassBinding> {
        self.graph
            .nodes()
            .filter_map(|node| match &node.kind {
                NodeKind::Action { class, .. } => Some(ClassBinding {
                    node_id: node.id.clone(),
                    class: class.clone(),
                    publish: true,
                }),
                NodeKind::Outcome { class } => Some(ClassBinding {
                    node_id: node.id.clone(),
                    class: class.clone(),
                    publish: false,
                }),
                _ => None,
            })
            .collect()
    }

    pub fn bind_class(&mut self, node_id: &str, handle: ClassHandle) -> Result<(), CoaError> {
        let node = self
            .graph
            .node_mut(node_id)
            .ok_or_else(|| CoaError::UnknownNode(node_id.to_string()))?;
        node.class_handle = Some(handle);
        Ok(())
    }

    /// Take a node out of the run; it never becomes a root
    pub fn disable(&mut self, node_id: &str) -> Result<(), CoaError> {
        let node = self
            .graph
            .node_mut(node_id)
            .ok_or_else(|| CoaError::UnknownNode(node_id.to_string()))?;
        node.disabled = true;
        Ok(())
    }

    /// Run one pass at simulated time `now`
    pub fn advance(
        &mut self,
        now: f64,
        correlator: &mut InteractionCorrelator,
        rng: &mut RngManager,
    ) -> CoaPass {
        let mut pass = CoaPass::default();
        let mut started: HashSet<usize> = HashSet::new();

        // Every productive round executes at least one node.
        for _ in 0..=self.graph.len() {
            let roots = self.graph.roots();
            if roots.is_empty() {
                pass.exhausted = !self.graph.is_empty();
                break;
            }

            let mut fired = false;
            for idx in roots {
                if self.visit(idx, now, correlator, rng, &mut started, &mut pass) {
                    let node = self.graph.at_mut(idx);
                    node.mark_executed(now);
                    debug!(node_id = %node.id, kind = node.kind.name(), time = now, "COA node executed");
                    pass.executed.push(ExecutedNode {
                        node_id: node.id.clone(),
                        kind: node.kind.name(),
                    });
                    fired = true;
                }
            }
            if !fired {
                break;
            }
        }

        correlator.clear_all();
        pass
    }

    /// Apply the firing rule of one root; returns whether it fired
    fn visit(
        &mut self,
        idx: usize,
        now: f64,
        correlator: &InteractionCorrelator,
        rng: &mut RngManager,
        started: &mut HashSet<usize>,
        pass: &mut CoaPass,
    ) -> bool {
        let kind = self.graph.at(idx).kind.clone();
        match kind {
            NodeKind::SyncPoint { target_time, .. } => now >= target_time,

            NodeKind::AwaitN { .. } => true,

            NodeKind::Fork { .. } | NodeKind::ProbabilisticChoice { .. } => true,

            NodeKind::Duration { length } => self.visit_timer(idx, now, started, || length),

            NodeKind::RandomDuration {
                lower_bound,
                upper_bound,
            } => self.visit_timer(idx, now, started, || rng.uniform(lower_bound, upper_bound)),

            NodeKind::Action { class, parameters } => {
                let node_id = self.graph.at(idx).id.clone();
                if self.end_class.as_deref() == Some(class.as_str()) {
                    info!(node_id = %node_id, class = %class, "COA action requests end of simulation");
                    pass.effects.push(CoaEffect::Terminate { node_id });
                } else {
                    let mut interaction = Interaction::new(class);
                    interaction.parameters = parameters;
                    pass.effects.push(CoaEffect::Send {
                        node_id,
                        interaction,
                    });
                }
                true
            }

            NodeKind::Outcome { .. } => {
                let node = self.graph.at_mut(idx);
                let since = *node.await_start.get_or_insert(now);
                Self::observe(node, since, correlator)
            }

            NodeKind::OutcomeFilter => {
                let node_id = self.graph.at(idx).id.clone();
                let Some(outcome_idx) = self.graph.bound_outcome(idx) else {
                    warn!(node_id = %node_id, "Outcome filter not wired to an outcome; passing");
                    return true;
                };

                let outcome = self.graph.at_mut(outcome_idx);
                if let Some(since) = outcome.await_start {
                    Self::observe(outcome, since, correlator);
                }
                let observed = self.graph.at(outcome_idx).observed.as_ref();
                match self.filters.evaluate(&node_id, observed) {
                    Some(passed) => passed,
                    None => {
                        error!(node_id = %node_id, "No filter registered for outcome filter");
                        false
                    }
                }
            }
        }
    }

    fn visit_timer(
        &mut self,
        idx: usize,
        now: f64,
        started: &mut HashSet<usize>,
        length: impl FnOnce() -> f64,
    ) -> bool {
        let node = self.graph.at_mut(idx);
        match node.timer {
            Some(timer) => !started.contains(&idx) && timer.elapsed(now),
            None => {
                let length = length();
                debug!(node_id = %node.id, start = now, length, "COA timer started");
                node.timer = Some(NodeTimer { start: now, length });
                started.insert(idx);
                false
            }
        }
    }

    /// Match an Outcome against arrivals after `since`, keeping the record
    fn observe(node: &mut CoaNode, since: f64, correlator: &InteractionCorrelator) -> bool {
        let Some(class) = node.class_handle else {
            return false;
        };
        match correlator.find_since(class, since) {
            Some(arrived) => {
                node.observed = Some(arrived.clone());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coa::edge::CoaEdge;
    use crate::coa::node::NodeSpec;

    fn fork(id: &str) -> NodeSpec {
        NodeSpec::new(id, NodeKind::Fork { decision_point: false })
    }

    fn outcome(id: &str, class: &str) -> NodeSpec {
        NodeSpec::new(id, NodeKind::Outcome { class: class.to_string() })
    }

    fn executor(nodes: Vec<NodeSpec>, edges: Vec<CoaEdge>) -> CoaExecutor {
        CoaExecutor::new(CoaGraph::from_parts(nodes, edges).unwrap(), FilterRegistry::new()).unwrap()
    }

    #[test]
    fn test_chain_unlocks_within_one_pass() {
        let mut exec = executor(
            vec![fork("a"), fork("b"), fork("c")],
            vec![CoaEdge::flow("a", "b"), CoaEdge::flow("b", "c")],
        );
        let pass = exec.advance(0.0, &mut InteractionCorrelator::new(), &mut RngManager::new(1));

        let ids: Vec<_> = pass.executed.iter().map(|e| e.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(pass.exhausted);
    }

    #[test]
    fn test_zero_length_duration_waits_one_pass() {
        let mut exec = executor(vec![NodeSpec::new("d", NodeKind::Duration { length: 0.0 }), fork("x")], vec![CoaEdge::flow("x", "d")]);
        let mut correlator = InteractionCorrelator::new();
        let mut rng = RngManager::new(1);

        let first = exec.advance(0.0, &mut correlator, &mut rng);
        assert_eq!(first.executed.len(), 1);
        assert!(exec.node("d").unwrap().timer.is_some());
        assert!(!exec.node("d").unwrap().is_executed());

        let second = exec.advance(0.0, &mut correlator, &mut rng);
        assert_eq!(second.executed[0].node_id, "d");
    }

    #[test]
    fn test_random_duration_samples_within_bounds() {
        let mut exec = executor(
            vec![NodeSpec::new(
                "r",
                NodeKind::RandomDuration {
                    lower_bound: 2.0,
                    upper_bound: 4.0,
                },
            )],
            vec![],
        );
        exec.advance(1.0, &mut InteractionCorrelator::new(), &mut RngManager::new(99));

        let timer = exec.node("r").unwrap().timer.unwrap();
        assert_eq!(timer.start, 1.0);
        assert!((2.0..=4.0).contains(&timer.length));
    }

    #[test]
    fn test_sync_point_waits_for_target_time() {
        let mut exec = executor(
            vec![NodeSpec::new(
                "sp",
                NodeKind::SyncPoint {
                    target_time: 5.0,
                    required_branches: 0,
                },
            )],
            vec![],
        );
        let mut correlator = InteractionCorrelator::new();
        let mut rng = RngManager::new(1);

        assert!(exec.advance(4.9, &mut correlator, &mut rng).executed.is_empty());
        assert_eq!(exec.advance(5.0, &mut correlator, &mut rng).executed.len(), 1);
        assert_eq!(exec.node("sp").unwrap().completed_at, Some(5.0));
    }

    #[test]
    fn test_action_emits_send_or_terminate() {
        let mut exec = executor(
            vec![
                NodeSpec::new(
                    "ping",
                    NodeKind::Action {
                        class: "Ping".to_string(),
                        parameters: Default::default(),
                    },
                ),
                NodeSpec::new(
                    "stop",
                    NodeKind::Action {
                        class: "SimEnd".to_string(),
                        parameters: Default::default(),
                    },
                ),
            ],
            vec![],
        )
        .with_end_class("SimEnd");

        let pass = exec.advance(0.0, &mut InteractionCorrelator::new(), &mut RngManager::new(1));
        assert!(pass.effects.contains(&CoaEffect::Send {
            node_id: "ping".to_string(),
            interaction: Interaction::new("Ping"),
        }));
        assert!(pass.effects.contains(&CoaEffect::Terminate {
            node_id: "stop".to_string()
        }));
    }

    #[test]
    fn test_outcome_records_observed_interaction() {
        let mut exec = executor(vec![outcome("pong", "Pong")], vec![]);
        exec.bind_class("pong", ClassHandle(3)).unwrap();
        let mut correlator = InteractionCorrelator::new();
        let mut rng = RngManager::new(1);

        exec.advance(1.0, &mut correlator, &mut rng);
        correlator.record(ClassHandle(3), 2.0, Interaction::new("Pong"));
        let pass = exec.advance(2.0, &mut correlator, &mut rng);

        assert_eq!(pass.executed.len(), 1);
        let observed = exec.node("pong").unwrap().observed.as_ref().unwrap();
        assert_eq!(observed.arrival_time, 2.0);
    }

    #[test]
    fn test_outcome_filter_gates_on_observation() {
        let graph = CoaGraph::from_parts(
            vec![outcome("pong", "Pong"), NodeSpec::new("big", NodeKind::OutcomeFilter)],
            vec![CoaEdge::flow("pong", "big")],
        )
        .unwrap();
        let filters = FilterRegistry::new().with("big", |observed| {
            observed
                .and_then(|a| a.interaction.parameter("size"))
                .and_then(|v| v.as_i64())
                .map_or(false, |size| size > 10)
        });
        let mut exec = CoaExecutor::new(graph, filters).unwrap();
        exec.bind_class("pong", ClassHandle(1)).unwrap();
        let mut correlator = InteractionCorrelator::new();
        let mut rng = RngManager::new(1);

        exec.advance(0.0, &mut correlator, &mut rng);
        correlator.record(
            ClassHandle(1),
            1.0,
            Interaction::new("Pong").with_parameter("size", serde_json::json!(3)),
        );
        let pass = exec.advance(1.0, &mut correlator, &mut rng);
        assert_eq!(pass.executed.len(), 1);
        assert!(!exec.node("big").unwrap().is_executed());

        correlator.record(
            ClassHandle(1),
            2.0,
            Interaction::new("Pong").with_parameter("size", serde_json::json!(42)),
        );
        let pass = exec.advance(2.0, &mut correlator, &mut rng);
        assert_eq!(pass.executed[0].node_id, "big");
    }

    #[test]
    fn test_missing_filter_rejected() {
        let graph = CoaGraph::from_parts(
            vec![NodeSpec::new("lonely", NodeKind::OutcomeFilter)],
            vec![],
        )
        .unwrap();
        let err = CoaExecutor::new(graph, FilterRegistry::new()).unwrap_err();
        assert_eq!(err, CoaError::MissingFilter("lonely".to_string()));
    }

    #[test]
    fn test_unwired_filter_passes() {
        let graph = CoaGraph::from_parts(vec![NodeSpec::new("f", NodeKind::OutcomeFilter)], vec![]).unwrap();
        let mut exec =
            CoaExecutor::new(graph, FilterRegistry::new().with("f", |_| false)).unwrap();
        let pass = exec.advance(0.0, &mut InteractionCorrelator::new(), &mut RngManager::new(1));
        assert_eq!(pass.executed.len(), 1);
    }

    #[test]
    fn test_disabled_node_blocks_descendants() {
        let mut exec = executor(
            vec![outcome("pong", "Pong"), fork("after")],
            vec![CoaEdge::flow("pong", "after")],
        );
        exec.disable("pong").unwrap();
        let pass = exec.advance(0.0, &mut InteractionCorrelator::new(), &mut RngManager::new(1));
        assert!(pass.executed.is_empty());
        assert!(pass.exhausted);
    }

    #[test]
    fn test_exception_join_waits_for_every_flow() {
        let mut exec = executor(
            vec![
                fork("start"),
                NodeSpec::new("left", NodeKind::Duration { length: 1.0 }),
                NodeSpec::new("right", NodeKind::Duration { length: 3.0 }),
                fork("joined"),
            ],
            vec![
                CoaEdge::flow("start", "left").on_flow("L"),
                CoaEdge::flow("start", "right").on_flow("R"),
                CoaEdge::exception_join("left", "joined", ["L", "R"]),
            ],
        );
        let mut correlator = InteractionCorrelator::new();
        let mut rng = RngManager::new(1);

        exec.advance(0.0, &mut correlator, &mut rng);
        exec.advance(1.0, &mut correlator, &mut rng);
        assert!(exec.node("left").unwrap().is_executed());
        assert!(!exec.node("joined").unwrap().is_executed());

        exec.advance(3.0, &mut correlator, &mut rng);
        assert_eq!(exec.node("joined").unwrap().completed_at, Some(3.0));
    }

    #[test]
    fn test_empty_graph_is_never_exhausted() {
        let mut exec = executor(vec![], vec![]);
        let pass = exec.advance(0.0, &mut InteractionCorrelator::new(), &mut RngManager::new(1));
        assert!(!pass.exhausted);
    }
}

//! Outcome filter registry
//!
//! Each OutcomeFilter node is evaluated by a predicate registered under the
//! node's ID. The registry is checked against the graph when the executor is
//! built, so a missing predicate is a load-time error.

use crate::models::interaction::ArrivedInteraction;
use std::collections::HashMap;
use std::fmt;

/// Predicate over the bound Outcome's last observed interaction
///
/// Receives `None` when the Outcome has not observed anything yet.
pub type OutcomeFilterFn = dyn Fn(Option<&ArrivedInteraction>) -> bool + Send + Sync;

/// Filter predicates keyed by OutcomeFilter node ID
///
/// # Example
/// ```
/// use federation_manager_core_rs::coa::FilterRegistry;
///
/// let filters = FilterRegistry::new().with("high_score", |observed| {
///     observed
///         .and_then(|arrived| arrived.interaction.parameter("score"))
///         .and_then(|score| score.as_f64())
///         .map_or(false, |score| score > 0.5)
/// });
/// assert!(filters.contains("high_score"));
/// ```
#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Box<OutcomeFilterFn>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the predicate for a filter node
    pub fn register<F>(&mut self, node_id: impl Into<String>, filter: F)
    where
        F: Fn(Option<&ArrivedInteraction>) -> bool + Send + Sync + 'static,
    {
        self.filters.insert(node_id.into(), Box::new(filter));
    }

    pub fn with<F>(mut self, node_id: impl Into<String>, filter: F) -> Self
    where
        F: Fn(Option<&ArrivedInteraction>) -> bool + Send + Sync + 'static,
    {
        self.register(node_id, filter);
        self
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.filters.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluate the filter for `node_id`; `None` if none is registered
    pub fn evaluate(&self, node_id: &str, observed: Option<&ArrivedInteraction>) -> Option<bool> {
        self.filters.get(node_id).map(|filter| filter(observed))
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.filters.keys().collect();
        ids.sort();
        f.debug_struct("FilterRegistry").field("filters", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interaction::{ClassHandle, Interaction};

    #[test]
    fn test_evaluate_registered_filter() {
        let filters = FilterRegistry::new().with("seen", |observed| observed.is_some());
        let arrived = ArrivedInteraction {
            class: ClassHandle(1),
            arrival_time: 2.0,
            interaction: Interaction::new("Pong"),
        };

        assert_eq!(filters.evaluate("seen", Some(&arrived)), Some(true));
        assert_eq!(filters.evaluate("seen", None), Some(false));
        assert_eq!(filters.evaluate("other", None), None);
    }
}

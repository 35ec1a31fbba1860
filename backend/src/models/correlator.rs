//! Arrived-interaction correlator
//!
//! Collects, per interaction class, every interaction that arrived since
//! the last COA pass. Outcome nodes query it for a record newer than the
//! moment they started waiting.
//!
//! The table is wiped wholesale after each COA pass, whether or not any
//! Outcome consumed a record. An Outcome that is not yet eligible when a
//! message arrives will therefore never see that message.

use crate::models::interaction::{ArrivedInteraction, ClassHandle, Interaction};
use std::collections::HashMap;

/// Per-class table of interactions received during the current step
#[derive(Debug, Clone, Default)]
pub struct InteractionCorrelator {
    arrivals: HashMap<ClassHandle, Vec<ArrivedInteraction>>,
}

impl InteractionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arrival to its class list
    pub fn record(&mut self, class: ClassHandle, arrival_time: f64, interaction: Interaction) {
        self.arrivals
            .entry(class)
            .or_default()
            .push(ArrivedInteraction {
                class,
                arrival_time,
                interaction,
            });
    }

    /// First record of `class` that arrived strictly after `since`
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::models::correlator::InteractionCorrelator;
    /// use federation_manager_core_rs::{ClassHandle, Interaction};
    ///
    /// let mut correlator = InteractionCorrelator::new();
    /// correlator.record(ClassHandle(1), 10.0, Interaction::new("Pong"));
    ///
    /// assert!(correlator.find_since(ClassHandle(1), 10.0).is_none());
    /// assert!(correlator.find_since(ClassHandle(1), 9.5).is_some());
    /// ```
    pub fn find_since(&self, class: ClassHandle, since: f64) -> Option<&ArrivedInteraction> {
        self.arrivals
            .get(&class)?
            .iter()
            .find(|record| record.arrival_time > since)
    }

    /// Number of records held for a class
    pub fn count(&self, class: ClassHandle) -> usize {
        self.arrivals.get(&class).map_or(0, Vec::len)
    }

    /// Total records across all classes
    pub fn total(&self) -> usize {
        self.arrivals.values().map(Vec::len).sum()
    }

    /// Empty every per-class list
    pub fn clear_all(&mut self) {
        for records in self.arrivals.values_mut() {
            records.clear();
        }
    }
}

//! Scripted interaction scheduling
//!
//! This module handles:
//! - Holding scripted interactions ordered by injection time
//! - Releasing every interaction whose time falls in the current step's
//!   send window, exactly once
//! - Reporting interactions whose window has already passed

use crate::core::time::TimeKey;
use crate::events::types::{Emission, ScriptedInjection};
use crate::models::interaction::Interaction;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use tracing::error;

/// Time-ordered table of pending scripted interactions
///
/// # Example
/// ```
/// use federation_manager_core_rs::events::{ScenarioScheduler, ScriptedInjection};
/// use federation_manager_core_rs::Interaction;
///
/// let mut scheduler = ScenarioScheduler::new(vec![
///     ScriptedInjection::new(5.0, Interaction::new("Ping")),
/// ]);
///
/// // Window [3.10001, 4.10001): nothing yet
/// assert!(scheduler.emit_due(3.0, 0.1, 1.0).due.is_empty());
///
/// // Window [4.10001, 5.10001): released once
/// let emission = scheduler.emit_due(4.0, 0.1, 1.0);
/// assert_eq!(emission.due.len(), 1);
/// assert_eq!(scheduler.pending(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScenarioScheduler {
    table: BTreeMap<TimeKey, Vec<Interaction>>,
    missed_reported: BTreeSet<TimeKey>,
}

impl ScenarioScheduler {
    pub fn new(injections: impl IntoIterator<Item = ScriptedInjection>) -> Self {
        let mut scheduler = Self::default();
        for injection in injections {
            scheduler.schedule(injection);
        }
        scheduler
    }

    /// Add an injection to the table
    pub fn schedule(&mut self, injection: ScriptedInjection) {
        self.table
            .entry(TimeKey(injection.time))
            .or_default()
            .push(injection.interaction);
    }

    /// Number of interactions still waiting in the table
    pub fn pending(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Earliest scheduled time still pending
    pub fn next_time(&self) -> Option<f64> {
        self.table.keys().next().map(|key| key.0)
    }

    /// Release everything due in this step's send window
    ///
    /// The window opens at `current + lookahead + lookahead / 10000` and is
    /// `step` wide. Buckets inside it are removed and returned.
    ///
    /// Buckets before the window are left in place and never sent. A missed
    /// bucket is reported on the first call that sees it, not on every later
    /// call: once the window has passed it every later window lies past it
    /// too, so repeating the report would only repeat the same error.
    pub fn emit_due(&mut self, current: f64, lookahead: f64, step: f64) -> Emission {
        let window_start = current + lookahead + lookahead / 10_000.0;
        let window_end = window_start + step;

        let mut missed = Vec::new();
        for (time, interactions) in self.table.range(..TimeKey(window_start)) {
            if !self.missed_reported.insert(*time) {
                continue;
            }
            for interaction in interactions {
                error!(
                    scheduled_time = time.0,
                    window_start,
                    class = %interaction.class,
                    "Missed scripted interaction window"
                );
                missed.push(ScriptedInjection::new(time.0, interaction.clone()));
            }
        }

        let due_keys: Vec<TimeKey> = self
            .table
            .range((
                Bound::Included(TimeKey(window_start)),
                Bound::Excluded(TimeKey(window_end)),
            ))
            .map(|(time, _)| *time)
            .collect();

        let mut due = Vec::new();
        for key in due_keys {
            if let Some(interactions) = self.table.remove(&key) {
                due.extend(
                    interactions
                        .into_iter()
                        .map(|interaction| ScriptedInjection::new(key.0, interaction)),
                );
            }
        }

        Emission {
            window_start,
            due,
            missed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler_at(times: &[f64]) -> ScenarioScheduler {
        ScenarioScheduler::new(
            times
                .iter()
                .map(|t| ScriptedInjection::new(*t, Interaction::new("Ping"))),
        )
    }

    #[test]
    fn test_window_is_one_step_wide() {
        let mut scheduler = scheduler_at(&[1.5, 2.2]);
        let emission = scheduler.emit_due(1.0, 0.1, 1.0);

        assert_eq!(emission.due.len(), 1);
        assert_eq!(emission.due[0].time, 1.5);
        assert_eq!(scheduler.next_time(), Some(2.2));
    }

    #[test]
    fn test_bucket_released_together_with_exact_time() {
        let mut scheduler = ScenarioScheduler::new(vec![
            ScriptedInjection::new(2.5, Interaction::new("A")),
            ScriptedInjection::new(2.5, Interaction::new("B")),
        ]);

        let emission = scheduler.emit_due(2.0, 0.1, 1.0);
        assert_eq!(emission.due.len(), 2);
        assert!(emission.due.iter().all(|i| i.time == 2.5));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_missed_reported_once_and_kept() {
        let mut scheduler = scheduler_at(&[0.05]);

        let first = scheduler.emit_due(0.0, 0.1, 1.0);
        assert_eq!(first.missed.len(), 1);
        assert!(first.due.is_empty());

        let second = scheduler.emit_due(1.0, 0.1, 1.0);
        assert!(second.missed.is_empty());
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_empty_scheduler_emits_nothing() {
        let mut scheduler = ScenarioScheduler::default();
        let emission = scheduler.emit_due(10.0, 0.5, 1.0);
        assert!(emission.is_empty());
        assert!((emission.window_start - 10.50005).abs() < 1e-9);
    }
}

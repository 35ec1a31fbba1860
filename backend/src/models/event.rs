//! Lifecycle event log for auditing a federation run.
//!
//! Every significant state change the manager observes or causes is
//! recorded here in addition to being emitted through `tracing`:
//! - **Membership**: federates joining and resigning
//! - **Barriers**: sync points achieved
//! - **Lifecycle**: state transitions and termination requests
//! - **Traffic**: interactions sent, scheduled injections missed
//! - **COA**: workflow nodes executed
//!
//! # Example
//!
//! ```rust
//! use federation_manager_core_rs::models::event::{EventLog, FederationEvent};
//!
//! let mut log = EventLog::new();
//! log.log(FederationEvent::SyncPointAchieved {
//!     time: 0.0,
//!     label: "ReadyToRun".to_string(),
//! });
//! assert_eq!(log.events_of_type("SyncPointAchieved").len(), 1);
//! ```

use crate::core::state::FederationState;
use crate::models::interaction::ObjectId;

/// Why the manager sent an interaction
#[derive(Debug, Clone, PartialEq)]
pub enum SendSource {
    /// Initialization message sent at phase start
    Initialization,
    /// Pre-scripted injection from the scenario table
    Script,
    /// COA Action node
    Action { node_id: String },
    /// End-of-simulation broadcast during termination
    EndOfSimulation,
}

/// Federation event capturing a state change.
///
/// All events carry the logical time at which they were recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum FederationEvent {
    /// Expected federate completed its attribute set and counts as joined
    FederateJoined {
        time: f64,
        role: String,
        object: ObjectId,
    },

    /// Expected federate left the federation
    FederateResigned {
        time: f64,
        role: String,
        object: ObjectId,
    },

    /// Named barrier reached by the whole federation
    SyncPointAchieved { time: f64, label: String },

    /// Lifecycle transition accepted by the state machine
    StateChanged {
        time: f64,
        from: FederationState,
        to: FederationState,
    },

    /// Interaction handed to the bus
    InteractionSent {
        time: f64,
        class: String,
        /// `None` for receive-ordered sends
        timestamp: Option<f64>,
        source: SendSource,
    },

    /// Scripted injection noticed after its window had already passed
    ScheduleMissed {
        time: f64,
        scheduled_time: f64,
        class: String,
    },

    /// COA node marked executed
    NodeExecuted {
        time: f64,
        node_id: String,
        kind: String,
    },

    /// Termination cascade started
    TerminationRequested { time: f64, reason: String },
}

impl FederationEvent {
    /// Logical time the event was recorded at
    pub fn time(&self) -> f64 {
        match self {
            FederationEvent::FederateJoined { time, .. }
            | FederationEvent::FederateResigned { time, .. }
            | FederationEvent::SyncPointAchieved { time, .. }
            | FederationEvent::StateChanged { time, .. }
            | FederationEvent::InteractionSent { time, .. }
            | FederationEvent::ScheduleMissed { time, .. }
            | FederationEvent::NodeExecuted { time, .. }
            | FederationEvent::TerminationRequested { time, .. } => *time,
        }
    }

    /// Get event type as string (for filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            FederationEvent::FederateJoined { .. } => "FederateJoined",
            FederationEvent::FederateResigned { .. } => "FederateResigned",
            FederationEvent::SyncPointAchieved { .. } => "SyncPointAchieved",
            FederationEvent::StateChanged { .. } => "StateChanged",
            FederationEvent::InteractionSent { .. } => "InteractionSent",
            FederationEvent::ScheduleMissed { .. } => "ScheduleMissed",
            FederationEvent::NodeExecuted { .. } => "NodeExecuted",
            FederationEvent::TerminationRequested { .. } => "TerminationRequested",
        }
    }

    /// Interaction class if the event concerns one
    pub fn class(&self) -> Option<&str> {
        match self {
            FederationEvent::InteractionSent { class, .. }
            | FederationEvent::ScheduleMissed { class, .. } => Some(class),
            _ => None,
        }
    }
}

/// Event log for storing and querying federation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<FederationEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: FederationEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[FederationEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&FederationEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get sends of a specific interaction class
    pub fn sends_of_class(&self, class: &str) -> Vec<&FederationEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == "InteractionSent" && e.class() == Some(class))
            .collect()
    }

    /// Logical time at which a COA node executed, if it did
    pub fn node_execution_time(&self, node_id: &str) -> Option<f64> {
        self.events.iter().find_map(|e| match e {
            FederationEvent::NodeExecuted {
                time, node_id: id, ..
            } if id == node_id => Some(*time),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_and_type() {
        let event = FederationEvent::NodeExecuted {
            time: 4.0,
            node_id: "n1".to_string(),
            kind: "Action".to_string(),
        };
        assert_eq!(event.time(), 4.0);
        assert_eq!(event.event_type(), "NodeExecuted");
        assert_eq!(event.class(), None);
    }

    #[test]
    fn test_sends_of_class() {
        let mut log = EventLog::new();
        log.log(FederationEvent::InteractionSent {
            time: 1.0,
            class: "Ping".to_string(),
            timestamp: Some(1.1),
            source: SendSource::Script,
        });
        log.log(FederationEvent::ScheduleMissed {
            time: 1.0,
            scheduled_time: 0.5,
            class: "Ping".to_string(),
        });
        log.log(FederationEvent::InteractionSent {
            time: 2.0,
            class: "Pong".to_string(),
            timestamp: None,
            source: SendSource::Initialization,
        });

        assert_eq!(log.sends_of_class("Ping").len(), 1);
        assert_eq!(log.sends_of_class("Pong").len(), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_node_execution_time() {
        let mut log = EventLog::new();
        log.log(FederationEvent::NodeExecuted {
            time: 3.0,
            node_id: "await".to_string(),
            kind: "Outcome".to_string(),
        });
        assert_eq!(log.node_execution_time("await"), Some(3.0));
        assert_eq!(log.node_execution_time("other"), None);
    }
}

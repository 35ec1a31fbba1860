//! Federation lifecycle state machine
//!
//! The Federation Manager moves through a fixed, total transition table:
//!
//! ```text
//! Initialized ──► Running ◄──► Paused
//!                    │            │
//!                    ├──► Finished│
//!                    └──► Terminated ◄┘
//! ```
//!
//! `Terminated` and `Finished` are terminal. Any transition not listed in
//! the table is rejected with [`LifecycleError::InvalidTransition`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of the federation as driven by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FederationState {
    Initialized,
    Running,
    Paused,
    /// Stopped by request or by an unrecoverable condition
    Terminated,
    /// Reached the configured end time or exhausted the COA graph
    Finished,
}

/// Errors raised by the lifecycle controller
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: FederationState,
        to: FederationState,
    },
}

impl FederationState {
    /// All states, in declaration order
    pub const ALL: [FederationState; 5] = [
        FederationState::Initialized,
        FederationState::Running,
        FederationState::Paused,
        FederationState::Terminated,
        FederationState::Finished,
    ];

    /// Check whether `self -> next` is in the transition table
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::FederationState;
    ///
    /// assert!(FederationState::Initialized.can_transition_to(FederationState::Running));
    /// assert!(!FederationState::Paused.can_transition_to(FederationState::Finished));
    /// ```
    pub fn can_transition_to(self, next: FederationState) -> bool {
        use FederationState::*;
        matches!(
            (self, next),
            (Initialized, Running)
                | (Running, Paused)
                | (Running, Terminated)
                | (Running, Finished)
                | (Paused, Running)
                | (Paused, Terminated)
        )
    }

    /// True for states with no outgoing transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, FederationState::Terminated | FederationState::Finished)
    }
}

impl std::fmt::Display for FederationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FederationState::Initialized => "INITIALIZED",
            FederationState::Running => "RUNNING",
            FederationState::Paused => "PAUSED",
            FederationState::Terminated => "TERMINATED",
            FederationState::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// Holder for the current lifecycle state
///
/// Every mutation goes through [`StateMachine::transition`], which validates
/// against the table above.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: FederationState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: FederationState::Initialized,
        }
    }

    /// Current state
    pub fn state(&self) -> FederationState {
        self.current
    }

    /// Move to `next`, rejecting transitions outside the table
    ///
    /// Returns the previous state on success.
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::core::state::{StateMachine, FederationState};
    ///
    /// let mut sm = StateMachine::new();
    /// sm.transition(FederationState::Running).unwrap();
    /// assert!(sm.transition(FederationState::Initialized).is_err());
    /// assert_eq!(sm.state(), FederationState::Running);
    /// ```
    pub fn transition(&mut self, next: FederationState) -> Result<FederationState, LifecycleError> {
        if !self.current.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        let previous = self.current;
        self.current = next;
        Ok(previous)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [FederationState::Terminated, FederationState::Finished] {
            assert!(terminal.is_terminal());
            for next in FederationState::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut sm = StateMachine::new();
        let err = sm.transition(FederationState::Paused).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: FederationState::Initialized,
                to: FederationState::Paused,
            }
        );
        assert_eq!(sm.state(), FederationState::Initialized);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut sm = StateMachine::new();
        sm.transition(FederationState::Running).unwrap();
        sm.transition(FederationState::Paused).unwrap();
        sm.transition(FederationState::Running).unwrap();
        sm.transition(FederationState::Finished).unwrap();
        assert!(sm.state().is_terminal());
    }
}

//! Lifecycle state machine
//!
//! The transition table is total: listed transitions succeed, everything
//! else is rejected and leaves the state unchanged.

use federation_manager_core_rs::core::state::FederationState::{self, *};
use federation_manager_core_rs::{LifecycleError, StateMachine};
use proptest::prelude::*;

const ALLOWED: [(FederationState, FederationState); 6] = [
    (Initialized, Running),
    (Running, Paused),
    (Running, Terminated),
    (Running, Finished),
    (Paused, Running),
    (Paused, Terminated),
];

/// Drive a fresh machine into `state` through legal transitions
fn machine_in(state: FederationState) -> StateMachine {
    let mut machine = StateMachine::new();
    let path: &[FederationState] = match state {
        Initialized => &[],
        Running => &[Running],
        Paused => &[Running, Paused],
        Terminated => &[Running, Terminated],
        Finished => &[Running, Finished],
    };
    for next in path {
        machine.transition(*next).unwrap();
    }
    machine
}

fn any_state() -> impl Strategy<Value = FederationState> {
    prop::sample::select(FederationState::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_transition_matches_table(from in any_state(), to in any_state()) {
        let mut machine = machine_in(from);
        let allowed = ALLOWED.contains(&(from, to));
        let result = machine.transition(to);

        prop_assert_eq!(result.is_ok(), allowed);
        prop_assert_eq!(from.can_transition_to(to), allowed);
        if allowed {
            prop_assert_eq!(result.unwrap(), from);
            prop_assert_eq!(machine.state(), to);
        } else {
            prop_assert_eq!(result, Err(LifecycleError::InvalidTransition { from, to }));
            prop_assert_eq!(machine.state(), from);
        }
    }

    #[test]
    fn prop_terminal_states_have_no_exit(to in any_state()) {
        prop_assert!(machine_in(Terminated).transition(to).is_err());
        prop_assert!(machine_in(Finished).transition(to).is_err());
    }
}

#[test]
fn test_pause_resume_roundtrip() {
    let mut machine = machine_in(Running);
    machine.transition(Paused).unwrap();
    machine.transition(Running).unwrap();
    assert_eq!(machine.state(), Running);
}

#[test]
fn test_paused_cannot_finish() {
    let mut machine = machine_in(Paused);
    assert!(machine.transition(Finished).is_err());
    assert_eq!(machine.state(), Paused);
}

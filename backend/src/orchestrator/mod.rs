//! Orchestrator: lifecycle controller, step loop and termination cascade
//!
//! See `engine.rs` for the control flow and `federation.rs` for the state the
//! federation lock protects.

pub mod engine;
pub mod federation;

pub use federation::{FederationCore, TerminationReason};
pub use engine::{
    CallbackSink, FederationManager, RunSummary, StateListener, READY_TO_POPULATE, READY_TO_RUN,
};

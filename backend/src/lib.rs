//! Federation Manager Core - Rust Engine
//!
//! Orchestration engine for a federation of simulation processes sharing a
//! logical clock and a run-time infrastructure (RTI) bus.
//!
//! # Architecture
//!
//! - **core**: Lifecycle state machine and logical clock
//! - **models**: Interactions, membership tracking, correlator, event and
//!   monitor logs
//! - **events**: Scripted interaction timeline
//! - **coa**: Course of Action workflow graph and executor
//! - **bus**: RTI boundary, retry policy, loopback bus
//! - **orchestrator**: Federation manager, step loop, termination cascade
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Only transitions in the lifecycle table are ever applied
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Step bodies and callback dispatch share one lock

// Module declarations
pub mod bus;
pub mod coa;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod scenario;

// Re-exports for convenience
pub use bus::{BusCallback, BusError, LoopbackBus, RtiBus};
pub use coa::{CoaEdge, CoaError, CoaExecutor, CoaGraph, FilterRegistry, NodeKind, NodeSpec};
pub use config::{ConfigError, FederationConfig};
pub use core::state::{FederationState, LifecycleError, StateMachine};
pub use core::time::TimeManager;
pub use error::FederationError;
pub use events::{ScenarioScheduler, ScriptedInjection};
pub use models::{
    event::{EventLog, FederationEvent, SendSource},
    interaction::{ArrivedInteraction, ClassHandle, Interaction, ObjectId},
    membership::{ExpectedFederate, FederateMembership},
};
pub use orchestrator::{FederationManager, RunSummary};
pub use rng::RngManager;
pub use scenario::{ScenarioDescriptor, ScenarioError};

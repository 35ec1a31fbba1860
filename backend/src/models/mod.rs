//! Domain models shared by the orchestration components

pub mod correlator;
pub mod event;
pub mod interaction;
pub mod membership;
pub mod monitor;

// Re-exports
pub use correlator::InteractionCorrelator;
pub use event::{EventLog, FederationEvent, SendSource};
pub use interaction::{ArrivedInteraction, ClassHandle, Interaction, ObjectId};
pub use membership::{ExpectedFederate, FederateMembership, MembershipEvent};
pub use monitor::MonitorLog;

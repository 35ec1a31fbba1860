//! Boundary to the run-time infrastructure (RTI) bus
//!
//! The orchestration engine only talks to the bus through [`RtiBus`].
//! A production binding wraps a real RTI; [`LoopbackBus`] is an in-process
//! stand-in used by tests and dry runs.
//!
//! # Callback delivery
//!
//! Bus callbacks reach the engine in one of two ways, both of which end in
//! the same dispatch under the federation lock:
//! - **Pumped**: [`RtiBus::evoke_callbacks`] returns whatever is queued;
//!   the manager calls it while polling for grants and barriers.
//! - **Pushed**: a binding with its own delivery thread hands callbacks to
//!   [`CallbackSink::deliver`](crate::orchestrator::CallbackSink::deliver).

pub mod error;
pub mod loopback;
pub mod registry;
pub mod retry;

pub use error::BusError;
pub use loopback::{LoopbackBus, LoopbackProbe, SentInteraction};
pub use registry::InteractionRegistry;
pub use retry::RetryPolicy;

use crate::models::interaction::{ClassHandle, Interaction, ObjectId};
use std::collections::HashMap;
use std::path::Path;

/// Callback delivered by the bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusCallback {
    /// A federate object became visible
    ObjectDiscovered {
        object: ObjectId,
        class_name: String,
        name: String,
    },

    /// Attribute values reflected for a discovered object
    AttributesUpdated {
        object: ObjectId,
        attributes: HashMap<String, String>,
    },

    /// A federate object left the federation
    ObjectRemoved { object: ObjectId },

    /// An interaction arrived
    InteractionReceived {
        class: ClassHandle,
        interaction: Interaction,
        /// `None` for receive-ordered delivery
        timestamp: Option<f64>,
    },

    /// The outstanding time-advance request was granted
    TimeGranted { time: f64 },

    /// Every federate achieved the named sync point
    SyncPointAchieved { label: String },
}

/// Operations the federation manager consumes from the bus
///
/// Implementations must be `Send`: the bus lives inside the federation
/// lock and is driven from the step-loop thread.
pub trait RtiBus: Send {
    /// Create (if needed) and join the federation execution
    fn join(&mut self, federation: &str, federate: &str, fom: &Path) -> Result<(), BusError>;

    /// Become time-regulating and time-constrained with the given lookahead
    fn enable_time_management(&mut self, lookahead: f64) -> Result<(), BusError>;

    /// Subscribe to the federate object class used for membership tracking
    fn subscribe_federate_objects(&mut self) -> Result<(), BusError>;

    /// Resolve an interaction class name to its handle
    fn interaction_class(&mut self, name: &str) -> Result<ClassHandle, BusError>;

    fn publish_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError>;

    fn subscribe_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError>;

    /// Send an interaction; `timestamp == None` sends receive-ordered
    fn send_interaction(
        &mut self,
        class: ClassHandle,
        interaction: &Interaction,
        timestamp: Option<f64>,
    ) -> Result<(), BusError>;

    fn register_sync_point(&mut self, label: &str) -> Result<(), BusError>;

    /// Announce that this federate reached the sync point
    fn achieve_sync_point(&mut self, label: &str) -> Result<(), BusError>;

    fn request_time_advance(&mut self, time: f64) -> Result<(), BusError>;

    /// Non-blocking pump returning every callback currently available
    fn evoke_callbacks(&mut self) -> Result<Vec<BusCallback>, BusError>;

    /// Resign from the federation execution
    fn resign(&mut self) -> Result<(), BusError>;

    /// Tear the federation down, taking remaining federates with it
    fn force_terminate_federation(&mut self) -> Result<(), BusError>;
}

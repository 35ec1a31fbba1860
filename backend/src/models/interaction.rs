//! Interactions: time-stamped, typed messages exchanged over the bus
//!
//! Parameter values are kept as JSON values. Wire encoding belongs to the
//! bus binding, not to the orchestration engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter carrying the name of the federate that sent an interaction
pub const SOURCE_FED_PARAM: &str = "sourceFed";

/// Parameter carrying the federation the interaction was sent in
pub const FEDERATION_NAME_PARAM: &str = "federationName";

/// Bus-assigned handle for an interaction class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassHandle(pub u32);

impl std::fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Bus-assigned identifier of a discovered object instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// An interaction to send or one that was received
///
/// # Example
/// ```
/// use federation_manager_core_rs::Interaction;
/// use serde_json::json;
///
/// let ping = Interaction::new("Ping").with_parameter("sequence", json!(1));
/// assert_eq!(ping.parameter("sequence"), Some(&json!(1)));
/// assert_eq!(ping.describe(), "sequence=1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Fully qualified interaction class name
    pub class: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

impl Interaction {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Stamp the parameters identifying the sending federate and federation
    ///
    /// Existing values are overwritten: the manager is always the sender of
    /// what it emits.
    pub fn stamp_origin(&mut self, federate_name: &str, federation_name: &str) {
        self.set_parameter(SOURCE_FED_PARAM, Value::String(federate_name.to_string()));
        self.set_parameter(
            FEDERATION_NAME_PARAM,
            Value::String(federation_name.to_string()),
        );
    }

    /// `name=value` pairs in parameter order, space separated
    pub fn describe(&self) -> String {
        self.parameters
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("{}={}", name, s),
                other => format!("{}={}", name, other),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A received interaction as seen by the correlator
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivedInteraction {
    pub class: ClassHandle,
    /// Timestamp of the message, or the logical time it was received at
    /// for receive-ordered messages
    pub arrival_time: f64,
    pub interaction: Interaction,
}

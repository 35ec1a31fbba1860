//! Scripted interaction types
//!
//! A scripted injection is an interaction the scenario wants sent at a
//! fixed simulated time, independently of the COA workflow.
//!
//! # Design Principles
//!
//! 1. **Exact timestamps**: an injection is sent with its scheduled time,
//!    never with the time it was noticed
//! 2. **At most once**: an injection leaves the table the moment a send is
//!    attempted, whatever the outcome
//! 3. **Self-contained**: injections carry the whole interaction to send

use crate::models::interaction::Interaction;
use serde::{Deserialize, Serialize};

/// An interaction scheduled for a specific simulated time
///
/// In scenario files the interaction fields sit next to `time`:
///
/// ```json
/// { "time": 5.0, "class": "Ping", "parameters": { "sequence": 1 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedInjection {
    /// Simulated time the interaction is stamped with
    pub time: f64,

    #[serde(flatten)]
    pub interaction: Interaction,
}

impl ScriptedInjection {
    pub fn new(time: f64, interaction: Interaction) -> Self {
        Self { time, interaction }
    }
}

/// Result of one scheduler emission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    /// Earliest timestamp the federation can still accept this step
    pub window_start: f64,

    /// Injections falling in `[window_start, window_start + step)`;
    /// already removed from the table
    pub due: Vec<ScriptedInjection>,

    /// Injections noticed too late this call for the first time; they
    /// remain in the table
    pub missed: Vec<ScriptedInjection>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.due.is_empty() && self.missed.is_empty()
    }
}

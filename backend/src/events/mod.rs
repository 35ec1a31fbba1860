//! Scripted interaction timeline

pub mod handler;
pub mod types;

pub use handler::ScenarioScheduler;
pub use types::{Emission, ScriptedInjection};

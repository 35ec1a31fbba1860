//! Crate-level error type

use crate::bus::BusError;
use crate::coa::CoaError;
use crate::config::ConfigError;
use crate::core::state::LifecycleError;
use crate::scenario::ScenarioError;
use thiserror::Error;

/// Any failure surfaced by the federation manager
#[derive(Debug, Error)]
pub enum FederationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Coa(#[from] CoaError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The run stopped before reaching the requested point
    #[error("Federation aborted: {0}")]
    Aborted(String),
}

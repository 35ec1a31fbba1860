//! Scenario descriptor
//!
//! Everything a run needs beyond configuration: expected federates, the
//! initialization burst, the scripted timeline, pause points, monitored
//! classes and the COA graph. Parsed from JSON and validated as a whole
//! before the manager touches the bus.
//!
//! # Example
//! ```
//! use federation_manager_core_rs::scenario::ScenarioDescriptor;
//!
//! let scenario = ScenarioDescriptor::from_json_str(r#"{
//!     "expected_federates": [{ "role": "Pong" }],
//!     "scripted_interactions": [{ "time": 5.0, "class": "Ping" }],
//!     "coa": {
//!         "nodes": [
//!             { "id": "ping", "type": "action", "class": "Ping" },
//!             { "id": "pong", "type": "outcome", "class": "Pong" }
//!         ],
//!         "edges": [{ "from": "ping", "to": "pong", "type": "flow" }]
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(scenario.expected_federates[0].count, 1);
//! assert_eq!(scenario.build_graph().unwrap().len(), 2);
//! ```

use crate::coa::{CoaEdge, CoaError, CoaGraph, NodeSpec};
use crate::events::ScriptedInjection;
use crate::models::interaction::Interaction;
use crate::models::membership::ExpectedFederate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),

    #[error("Invalid COA graph: {0}")]
    Coa(#[from] CoaError),
}

/// COA graph as written in the scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoaDescriptor {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<CoaEdge>,
}

/// In-memory scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    #[serde(default)]
    pub expected_federates: Vec<ExpectedFederate>,

    /// Sent receive-ordered once the federation is ready to run
    #[serde(default)]
    pub init_interactions: Vec<Interaction>,

    #[serde(default)]
    pub scripted_interactions: Vec<ScriptedInjection>,

    #[serde(default)]
    pub pause_times: Vec<f64>,

    /// Received classes written to the monitor log
    #[serde(default)]
    pub monitored_classes: Vec<String>,

    #[serde(default)]
    pub coa: CoaDescriptor,
}

impl ScenarioDescriptor {
    /// Parse and validate
    pub fn from_json_str(input: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(input)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Structural checks, including a trial build of the COA graph
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut roles = HashSet::new();
        for federate in &self.expected_federates {
            if federate.role.trim().is_empty() {
                return Err(ScenarioError::Invalid(
                    "expected federate with empty role".to_string(),
                ));
            }
            if federate.count == 0 {
                return Err(ScenarioError::Invalid(format!(
                    "expected federate {} has count 0",
                    federate.role
                )));
            }
            if !roles.insert(federate.role.as_str()) {
                return Err(ScenarioError::Invalid(format!(
                    "expected federate {} listed twice",
                    federate.role
                )));
            }
        }

        let classes = self
            .init_interactions
            .iter()
            .chain(self.scripted_interactions.iter().map(|s| &s.interaction))
            .map(|i| i.class.as_str())
            .chain(self.monitored_classes.iter().map(String::as_str));
        for class in classes {
            if class.trim().is_empty() {
                return Err(ScenarioError::Invalid(
                    "interaction with empty class name".to_string(),
                ));
            }
        }

        if let Some(bad) = self
            .scripted_interactions
            .iter()
            .find(|s| !s.time.is_finite() || s.time < 0.0)
        {
            return Err(ScenarioError::Invalid(format!(
                "scripted {} at invalid time {}",
                bad.interaction.class, bad.time
            )));
        }

        if let Some(bad) = self
            .pause_times
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0)
        {
            return Err(ScenarioError::Invalid(format!("invalid pause time {}", bad)));
        }

        self.build_graph()?;
        Ok(())
    }

    /// Build a fresh COA graph from the descriptor
    pub fn build_graph(&self) -> Result<CoaGraph, ScenarioError> {
        Ok(CoaGraph::from_parts(
            self.coa.nodes.iter().cloned(),
            self.coa.edges.iter().cloned(),
        )?)
    }

    /// Distinct interaction classes the manager publishes
    pub fn published_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = Vec::new();
        let sent = self
            .init_interactions
            .iter()
            .chain(self.scripted_interactions.iter().map(|s| &s.interaction))
            .map(|i| &i.class);
        for class in sent {
            if !classes.contains(class) {
                classes.push(class.clone());
            }
        }
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scenario_is_valid() {
        let scenario = ScenarioDescriptor::from_json_str("{}").unwrap();
        assert!(scenario.expected_federates.is_empty());
        assert!(scenario.build_graph().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            ScenarioDescriptor::from_json_str("{ not json"),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let result = ScenarioDescriptor::from_json_str(
            r#"{ "expected_federates": [{ "role": "A" }, { "role": "A", "count": 2 }] }"#,
        );
        assert!(matches!(result, Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_bad_graph_surfaces_coa_error() {
        let result = ScenarioDescriptor::from_json_str(
            r#"{ "coa": { "nodes": [{ "id": "a", "type": "fork" }],
                          "edges": [{ "from": "a", "to": "b", "type": "flow" }] } }"#,
        );
        assert!(matches!(result, Err(ScenarioError::Coa(_))));
    }

    #[test]
    fn test_published_classes_are_distinct() {
        let scenario = ScenarioDescriptor::from_json_str(
            r#"{ "init_interactions": [{ "class": "Init" }],
                 "scripted_interactions": [{ "time": 1.0, "class": "Ping" },
                                           { "time": 2.0, "class": "Ping" }] }"#,
        )
        .unwrap();
        assert_eq!(scenario.published_classes(), vec!["Init", "Ping"]);
    }
}

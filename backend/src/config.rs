//! Federation manager configuration
//!
//! Loaded from TOML; the CLI may override individual fields before
//! [`FederationConfig::validate`] runs. Validation happens before any bus
//! interaction so a bad value never leaves a half-joined federation.
//!
//! ```toml
//! federation_name = "PingPong"
//! fom_file = "fom/pingpong.xml"
//! script_file = "scenarios/pingpong.json"
//! step_size = 1.0
//! lookahead = 0.1
//! realtime = false
//! terminate_on_coa_finish = true
//! auto_start = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Log levels accepted by `log_level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn default_federate_name() -> String {
    "FederationManager".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_end_class() -> String {
    "SimEnd".to_string()
}

fn default_grace_period_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_resign_timeout_ms() -> u64 {
    10_000
}

/// Federation manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfig {
    pub federation_name: String,

    /// The manager's own federate role; never counted as a member
    #[serde(default = "default_federate_name")]
    pub federate_name: String,

    /// FOM/schema file handed to the bus on join
    pub fom_file: PathBuf,

    /// Scenario descriptor (JSON)
    pub script_file: PathBuf,

    /// Logical time advanced per step
    pub step_size: f64,

    pub lookahead: f64,

    /// Pace simulated time against the wall clock
    pub realtime: bool,

    /// End the run once no COA node can fire any more
    pub terminate_on_coa_finish: bool,

    #[serde(default)]
    pub federation_end_time: Option<f64>,

    /// Skip the manual start gate between the two startup barriers
    pub auto_start: bool,

    /// Seed for RandomDuration sampling
    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interaction class broadcast when the federation ends
    #[serde(default = "default_end_class")]
    pub end_interaction_class: String,

    /// Infrastructure roles ignored by membership tracking
    #[serde(default)]
    pub ignored_roles: Vec<String>,

    /// File receiving the monitor log
    #[serde(default)]
    pub monitor_log: Option<PathBuf>,

    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_resign_timeout_ms")]
    pub resign_timeout_ms: u64,

    /// Warn after this many consecutive empty grant polls
    #[serde(default)]
    pub stuck_poll_threshold: Option<u64>,
}

impl FederationConfig {
    /// Configuration with defaults for everything but the required core
    ///
    /// Auto-start is on; real-time pacing and COA-exhaustion termination
    /// are off.
    pub fn new(
        federation_name: impl Into<String>,
        fom_file: impl Into<PathBuf>,
        script_file: impl Into<PathBuf>,
        step_size: f64,
        lookahead: f64,
    ) -> Self {
        Self {
            federation_name: federation_name.into(),
            federate_name: default_federate_name(),
            fom_file: fom_file.into(),
            script_file: script_file.into(),
            step_size,
            lookahead,
            realtime: false,
            terminate_on_coa_finish: false,
            federation_end_time: None,
            auto_start: true,
            seed: 0,
            log_level: default_log_level(),
            end_interaction_class: default_end_class(),
            ignored_roles: Vec::new(),
            monitor_log: None,
            grace_period_ms: default_grace_period_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            resign_timeout_ms: default_resign_timeout_ms(),
            stuck_poll_threshold: None,
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load from a file; relative paths inside resolve against its directory
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.fom_file);
        resolve(&mut self.script_file);
        if let Some(monitor) = self.monitor_log.as_mut() {
            resolve(monitor);
        }
    }

    /// Check every field; the first problem found is returned
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

        if self.federation_name.trim().is_empty() {
            return invalid("federation_name", "must not be empty".to_string());
        }
        if self.federate_name.trim().is_empty() {
            return invalid("federate_name", "must not be empty".to_string());
        }
        if self.fom_file.as_os_str().is_empty() {
            return invalid("fom_file", "must not be empty".to_string());
        }
        if self.script_file.as_os_str().is_empty() {
            return invalid("script_file", "must not be empty".to_string());
        }
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return invalid("step_size", format!("{} must be finite and positive", self.step_size));
        }
        if !self.lookahead.is_finite() || self.lookahead <= 0.0 {
            return invalid("lookahead", format!("{} must be finite and positive", self.lookahead));
        }
        if let Some(end) = self.federation_end_time {
            if !end.is_finite() || end <= 0.0 {
                return invalid(
                    "federation_end_time",
                    format!("{} must be finite and positive", end),
                );
            }
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return invalid(
                "log_level",
                format!("`{}` is not one of {}", self.log_level, LOG_LEVELS.join("/")),
            );
        }
        if self.end_interaction_class.trim().is_empty() {
            return invalid("end_interaction_class", "must not be empty".to_string());
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms", "must be at least 1".to_string());
        }
        if self.stuck_poll_threshold == Some(0) {
            return invalid("stuck_poll_threshold", "must be at least 1 when set".to_string());
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn resign_timeout(&self) -> Duration {
        Duration::from_millis(self.resign_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        federation_name = "PingPong"
        fom_file = "fom.xml"
        script_file = "scenario.json"
        step_size = 1.0
        lookahead = 0.1
        realtime = false
        terminate_on_coa_finish = true
        auto_start = true
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = FederationConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.federate_name, "FederationManager");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.end_interaction_class, "SimEnd");
        assert_eq!(config.grace_period(), Duration::from_secs(2));
        assert_eq!(config.federation_end_time, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let broken = MINIMAL.replace("step_size = 1.0", "");
        assert!(matches!(
            FederationConfig::from_toml_str(&broken),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let mut config = FederationConfig::new("F", "fom.xml", "s.json", 0.0, 0.1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "step_size", .. })
        ));

        config.step_size = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut config = FederationConfig::new("F", "fom.xml", "s.json", 1.0, 0.1);
        config.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "log_level", .. })
        ));
    }

    #[test]
    fn test_end_time_must_be_positive() {
        let mut config = FederationConfig::new("F", "fom.xml", "s.json", 1.0, 0.1);
        config.federation_end_time = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let mut config = FederationConfig::from_toml_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/etc/fed"));
        assert_eq!(config.script_file, PathBuf::from("/etc/fed/scenario.json"));
        assert_eq!(config.fom_file, PathBuf::from("/etc/fed/fom.xml"));
    }
}

//! Line-oriented monitor log
//!
//! Every received interaction whose class is on the scenario's monitored
//! list is written as one line:
//!
//! ```text
//! time=3.000000 class=Pong sequence=4 sourceFed=PongCounter
//! ```

use crate::models::interaction::Interaction;
use std::collections::BTreeSet;
use std::io::Write;
use tracing::{info, warn};

/// Writes monitored interactions to a sink, one per line
pub struct MonitorLog {
    monitored: BTreeSet<String>,
    sink: Option<Box<dyn Write + Send>>,
    lines_written: usize,
}

impl MonitorLog {
    pub fn new<I, S>(monitored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitored: monitored.into_iter().map(Into::into).collect(),
            sink: None,
            lines_written: 0,
        }
    }

    /// Direct output to `sink`; without one, monitored lines only go to `tracing`
    pub fn with_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.set_sink(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sink = Some(sink);
    }

    pub fn is_monitored(&self, class: &str) -> bool {
        self.monitored.contains(class)
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Format one monitor line
    ///
    /// # Example
    /// ```
    /// use federation_manager_core_rs::models::monitor::MonitorLog;
    /// use federation_manager_core_rs::Interaction;
    /// use serde_json::json;
    ///
    /// let pong = Interaction::new("Pong").with_parameter("sequence", json!(4));
    /// assert_eq!(MonitorLog::format_line(3.0, &pong), "time=3.000000 class=Pong sequence=4");
    /// ```
    pub fn format_line(time: f64, interaction: &Interaction) -> String {
        let params = interaction.describe();
        if params.is_empty() {
            format!("time={:.6} class={}", time, interaction.class)
        } else {
            format!("time={:.6} class={} {}", time, interaction.class, params)
        }
    }

    /// Record `interaction` if its class is monitored
    ///
    /// Returns true when a line was produced. Sink failures are reported
    /// through `tracing` and never interrupt the federation.
    pub fn observe(&mut self, time: f64, interaction: &Interaction) -> bool {
        if !self.is_monitored(&interaction.class) {
            return false;
        }
        let line = Self::format_line(time, interaction);
        info!(target: "monitor", "{}", line);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
                warn!(error = %err, "Failed to write monitor line");
            }
        }
        self.lines_written += 1;
        true
    }
}

impl std::fmt::Debug for MonitorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorLog")
            .field("monitored", &self.monitored)
            .field("has_sink", &self.sink.is_some())
            .field("lines_written", &self.lines_written)
            .finish()
    }
}

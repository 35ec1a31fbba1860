//! Federation Manager CLI
//!
//! Loads a federation configuration and its scenario descriptor, then runs
//! the manager against the in-process loopback bus. Expected federates are
//! simulated by the bus, so a scenario can be exercised end to end without
//! an RTI.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario to its configured end time
//! fedmgr federation.toml
//!
//! # Override timing and stop at t=30
//! fedmgr federation.toml --step-size 0.5 --end-time 30 --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use federation_manager_core_rs::coa::{FilterRegistry, NodeKind};
use federation_manager_core_rs::{FederationConfig, FederationManager, LoopbackBus, ScenarioDescriptor};
use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Federation Manager
///
/// Drives a federation through startup, the stepped run and shutdown.
#[derive(Parser, Debug)]
#[command(name = "fedmgr")]
#[command(version, about, long_about = None)]
struct Args {
    /// Federation configuration (TOML)
    config: PathBuf,

    /// Override the federation name
    #[arg(long)]
    federation_name: Option<String>,

    /// Override the logical time step
    #[arg(long)]
    step_size: Option<f64>,

    /// Override the lookahead
    #[arg(long)]
    lookahead: Option<f64>,

    /// Terminate once logical time exceeds this value
    #[arg(long)]
    end_time: Option<f64>,

    /// Seed for random durations
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,

    /// Pace logical time against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Wait for a manual start instead of starting automatically
    #[arg(long)]
    manual_start: bool,

    /// Terminate once the course of action has nothing left to execute
    #[arg(long)]
    terminate_on_coa_finish: bool,
}

impl Args {
    fn apply(&self, config: &mut FederationConfig) {
        if let Some(name) = &self.federation_name {
            config.federation_name = name.clone();
        }
        if let Some(step) = self.step_size {
            config.step_size = step;
        }
        if let Some(lookahead) = self.lookahead {
            config.lookahead = lookahead;
        }
        if self.end_time.is_some() {
            config.federation_end_time = self.end_time;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.realtime |= self.realtime;
        config.terminate_on_coa_finish |= self.terminate_on_coa_finish;
        if self.manual_start {
            config.auto_start = false;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = FederationConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let scenario = ScenarioDescriptor::from_file(&config.script_file)
        .with_context(|| format!("loading scenario {}", config.script_file.display()))?;

    // No RTI behind the loopback bus, so filters accept whatever arrived
    let mut filters = FilterRegistry::new();
    for node in &scenario.coa.nodes {
        if matches!(node.kind, NodeKind::OutcomeFilter) {
            warn!(node_id = %node.id, "No filter bound in dry run; accepting every outcome");
            filters.register(node.id.clone(), |_| true);
        }
    }

    let bus = LoopbackBus::new()
        .with_peers(&scenario.expected_federates)
        .with_end_class(config.end_interaction_class.clone());

    let monitor_log = config.monitor_log.clone();
    let auto_start = config.auto_start;
    let mut manager = FederationManager::new(config, &scenario, filters, Box::new(bus))?;
    if let Some(path) = monitor_log {
        let file = File::create(&path)
            .with_context(|| format!("creating monitor log {}", path.display()))?;
        manager = manager.with_monitor_sink(Box::new(BufWriter::new(file)));
    }

    manager.on_state_change(|from, to| info!(%from, %to, "Federation state changed"));
    let manager = Arc::new(manager);

    if !auto_start {
        let gate = Arc::clone(&manager);
        thread::spawn(move || {
            eprintln!("Press Enter to start the federation");
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_ok() {
                if let Err(err) = gate.resume() {
                    warn!(error = %err, "Manual start failed");
                }
            }
        });
    }

    if !manager.start()? {
        anyhow::bail!("federation was already started");
    }
    let summary = manager.wait()?;

    info!(
        state = %summary.final_state,
        time = summary.final_time,
        steps = summary.steps,
        "Federation run complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

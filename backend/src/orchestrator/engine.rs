//! Federation Manager engine
//!
//! Lifecycle controller and step loop:
//! - Startup: join, declare classes, wait for expected federates, pass the
//!   two startup barriers (with an optional manual start gate between
//!   them), send initialization interactions
//! - Step loop on a dedicated thread: pace, run one step body under the
//!   federation lock, wait for the grant, check pause points, end time and
//!   queued termination
//! - Termination cascade on its own thread: broadcast end-of-simulation
//!   stamped at the instant termination began (the loop takes no further
//!   steps once it starts), clear the running flag, settle the final state, run the resign barrier and fall
//!   back to forcing the federation down
//!
//! # Architecture
//!
//! ```text
//! start():
//! 1. Join + enable time management + declare classes
//! 2. Wait for expected federates to join
//! 3. Barrier "ReadyToPopulate"
//! 4. Manual start gate (released by resume()) unless auto_start
//! 5. Barrier "ReadyToRun"
//! 6. Initialization interactions (receive-ordered)
//! 7. Initialized -> Running, spawn step loop
//!
//! Each step:
//! 1. Real-time pacing (slices of at most one second)
//! 2. If not paused, under the lock: scheduler -> COA pass -> advance request
//! 3. Poll callbacks until granted (abort if the running flag drops)
//! 4. Pause point exceeded -> Paused
//! 5. End time exceeded / COA termination -> termination cascade, and
//!    the loop issues no further steps
//! ```
//!
//! All waits are polling loops over the callback pump so a termination
//! request is observed within one poll interval.

use crate::bus::{BusCallback, BusError, RtiBus};
use crate::coa::{CoaExecutor, CoaNode, FilterRegistry};
use crate::config::FederationConfig;
use crate::core::state::FederationState;
use crate::core::time::TimeManager;
use crate::error::FederationError;
use crate::events::ScenarioScheduler;
use crate::models::event::{EventLog, SendSource};
use crate::models::interaction::Interaction;
use crate::models::membership::FederateMembership;
use crate::models::monitor::MonitorLog;
use crate::orchestrator::federation::{FederationCore, TerminationReason};
use crate::scenario::ScenarioDescriptor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// First startup barrier: every federate joined and may populate
pub const READY_TO_POPULATE: &str = "ReadyToPopulate";

/// Second startup barrier: the run may begin
pub const READY_TO_RUN: &str = "ReadyToRun";

/// Listener notified after every accepted state transition
pub type StateListener = dyn Fn(FederationState, FederationState) + Send + Sync;

// ============================================================================
// Run Summary
// ============================================================================

/// Final figures returned by [`FederationManager::wait`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: Uuid,
    pub final_state: FederationState,
    pub final_time: f64,
    pub steps: u64,
    pub interactions_sent: u64,
    pub send_failures: u64,
    pub nodes_executed: usize,
    pub events_logged: usize,
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug, Default)]
struct Flags {
    attempted: AtomicBool,
    running: AtomicBool,
    paused: AtomicBool,
    start_released: AtomicBool,
    stop_requested: AtomicBool,
    termination_started: AtomicBool,
    terminated: AtomicBool,
}

struct Shared {
    core: Mutex<FederationCore>,
    config: FederationConfig,
    session_id: Uuid,
    init_interactions: Vec<Interaction>,
    published_classes: Vec<String>,
    subscribed_classes: Vec<String>,
    flags: Flags,
    listeners: Mutex<Vec<Box<StateListener>>>,
    fatal: Mutex<Option<String>>,
    step_loop: Mutex<Option<JoinHandle<()>>>,
    terminator: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn sleep_poll(&self) {
        thread::sleep(self.config.poll_interval());
    }

    fn notify(&self, from: FederationState, to: FederationState) {
        for listener in self.listeners.lock().iter() {
            listener(from, to);
        }
    }

    /// Transition only if currently in `from`; returns whether it happened
    ///
    /// `commit` runs under the same lock as the transition, so the step loop
    /// never observes the new state without its side effects.
    fn transition_from(
        &self,
        from: FederationState,
        to: FederationState,
        commit: impl FnOnce(&mut FederationCore),
    ) -> Result<bool, FederationError> {
        {
            let mut core = self.core.lock();
            if core.state() != from {
                return Ok(false);
            }
            core.transition(to)?;
            commit(&mut core);
        }
        self.notify(from, to);
        Ok(true)
    }

    fn check_stop(&self, phase: &str) -> Result<(), FederationError> {
        if self.flags.stop_requested.load(Ordering::SeqCst) {
            warn!(session = %self.session_id, phase, "Startup aborted by termination request");
            return Err(FederationError::Aborted(format!(
                "termination requested while {}",
                phase
            )));
        }
        Ok(())
    }

    /// Pump callbacks until `done` holds for the core
    fn poll_until(
        &self,
        phase: &str,
        done: impl Fn(&FederationCore) -> bool,
    ) -> Result<(), FederationError> {
        loop {
            {
                let mut core = self.core.lock();
                core.pump_callbacks()?;
                if done(&core) {
                    return Ok(());
                }
            }
            self.check_stop(phase)?;
            self.sleep_poll();
        }
    }

    fn pause(&self) -> Result<bool, FederationError> {
        let paused =
            self.transition_from(FederationState::Running, FederationState::Paused, |_| {
                self.flags.paused.store(true, Ordering::SeqCst);
            })?;
        if paused {
            info!(session = %self.session_id, "Federation paused");
        }
        Ok(paused)
    }

    /// Record why the step loop gave up; returns the recorded reason
    fn record_fatal(&self, err: &BusError) -> String {
        let reason = if err.is_membership() {
            error!(session = %self.session_id, error = %err, "Federation membership lost");
            format!("federation membership lost: {}", err)
        } else {
            error!(session = %self.session_id, error = %err, "Fatal bus error in step loop");
            err.to_string()
        };
        self.fatal.lock().get_or_insert_with(|| reason.clone());
        reason
    }
}

// ============================================================================
// Federation Manager
// ============================================================================

/// Drives one federation run
///
/// # Example
/// ```no_run
/// use federation_manager_core_rs::bus::LoopbackBus;
/// use federation_manager_core_rs::coa::FilterRegistry;
/// use federation_manager_core_rs::config::FederationConfig;
/// use federation_manager_core_rs::scenario::ScenarioDescriptor;
/// use federation_manager_core_rs::orchestrator::FederationManager;
///
/// let mut config = FederationConfig::new("Demo", "fom.xml", "scenario.json", 1.0, 0.1);
/// config.federation_end_time = Some(10.0);
/// let scenario = ScenarioDescriptor::default();
///
/// let manager = FederationManager::new(
///     config,
///     &scenario,
///     FilterRegistry::new(),
///     Box::new(LoopbackBus::new()),
/// )
/// .unwrap();
/// manager.start().unwrap();
/// let summary = manager.wait().unwrap();
/// println!("finished at t={}", summary.final_time);
/// ```
pub struct FederationManager {
    shared: Arc<Shared>,
}

impl FederationManager {
    /// Validate configuration and scenario and assemble the engine
    ///
    /// Nothing touches the bus until [`start`](Self::start).
    pub fn new(
        config: FederationConfig,
        scenario: &ScenarioDescriptor,
        filters: FilterRegistry,
        bus: Box<dyn RtiBus>,
    ) -> Result<Self, FederationError> {
        config.validate()?;
        scenario.validate()?;

        let coa = CoaExecutor::new(scenario.build_graph()?, filters)?
            .with_end_class(config.end_interaction_class.clone());
        let time = TimeManager::new(config.step_size, config.lookahead, config.realtime)
            .with_pause_times(scenario.pause_times.iter().copied())
            .with_end_time(config.federation_end_time);
        let membership = FederateMembership::new(
            scenario.expected_federates.clone(),
            config.federate_name.clone(),
            config.ignored_roles.clone(),
        );
        let scheduler = ScenarioScheduler::new(scenario.scripted_interactions.iter().cloned());
        let monitor = MonitorLog::new(scenario.monitored_classes.iter().cloned());

        let mut published_classes = scenario.published_classes();
        if !published_classes.contains(&config.end_interaction_class) {
            published_classes.push(config.end_interaction_class.clone());
        }

        let core = FederationCore::new(&config, bus, time, membership, scheduler, coa, monitor);
        let session_id = Uuid::new_v4();
        info!(
            session = %session_id,
            federation = %config.federation_name,
            nodes = scenario.coa.nodes.len(),
            scripted = scenario.scripted_interactions.len(),
            "Federation manager created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                session_id,
                init_interactions: scenario.init_interactions.clone(),
                published_classes,
                subscribed_classes: scenario.monitored_classes.clone(),
                flags: Flags::default(),
                listeners: Mutex::new(Vec::new()),
                fatal: Mutex::new(None),
                step_loop: Mutex::new(None),
                terminator: Mutex::new(None),
                config,
            }),
        })
    }

    /// Write monitor lines to `sink` in addition to `tracing`
    pub fn with_monitor_sink(self, sink: Box<dyn Write + Send>) -> Self {
        self.shared.core.lock().monitor.set_sink(sink);
        self
    }

    /// Register a listener for accepted state transitions
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(FederationState, FederationState) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().push(Box::new(listener));
    }

    /// Handle for bindings that push callbacks from their own thread
    pub fn callback_sink(&self) -> CallbackSink {
        CallbackSink {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn state(&self) -> FederationState {
        self.shared.core.lock().state()
    }

    pub fn current_time(&self) -> f64 {
        self.shared.core.lock().time.current_time()
    }

    pub fn is_running(&self) -> bool {
        self.shared.flags.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.flags.paused.load(Ordering::SeqCst)
    }

    /// True once the termination cascade has completed
    pub fn is_terminated(&self) -> bool {
        self.shared.flags.terminated.load(Ordering::SeqCst)
    }

    /// Copy of the lifecycle event log
    pub fn event_log(&self) -> EventLog {
        self.shared.core.lock().events.clone()
    }

    /// Runtime copy of a COA node
    pub fn coa_node(&self, id: &str) -> Option<CoaNode> {
        self.shared.core.lock().coa.node(id).cloned()
    }

    /// Run startup and launch the step loop
    ///
    /// Blocks through the join wait, both barriers and the manual start
    /// gate. Returns `Ok(false)` if a start was already attempted.
    pub fn start(&self) -> Result<bool, FederationError> {
        let shared = &self.shared;
        if shared.flags.attempted.swap(true, Ordering::SeqCst) {
            warn!(session = %shared.session_id, "Federation start already attempted");
            return Ok(false);
        }
        info!(
            session = %shared.session_id,
            federation = %shared.config.federation_name,
            federate = %shared.config.federate_name,
            "Starting federation"
        );

        if let Err(err) = self.startup() {
            error!(session = %shared.session_id, error = %err, "Federation startup failed");
            if let Err(resign_err) = shared.core.lock().bus.resign() {
                debug!(error = %resign_err, "Resign after failed startup");
            }
            return Err(err);
        }

        {
            let mut core = shared.core.lock();
            core.transition(FederationState::Running)?;
            core.time.anchor_wall_clock(Instant::now());
        }
        shared.notify(FederationState::Initialized, FederationState::Running);
        shared.flags.running.store(true, Ordering::SeqCst);

        let loop_shared = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name("federation-step-loop".to_string())
            .spawn(move || run_step_loop(loop_shared))
            .map_err(|err| {
                shared.flags.running.store(false, Ordering::SeqCst);
                FederationError::Aborted(format!("failed to spawn step loop: {}", err))
            })?;
        *shared.step_loop.lock() = Some(handle);
        Ok(true)
    }

    fn startup(&self) -> Result<(), FederationError> {
        self.join_and_declare()?;
        self.wait_for_join()?;
        self.barrier(READY_TO_POPULATE)?;
        self.wait_for_start_gate()?;
        self.barrier(READY_TO_RUN)?;
        self.send_init_interactions();
        Ok(())
    }

    fn join_and_declare(&self) -> Result<(), FederationError> {
        let config = &self.shared.config;
        let mut core = self.shared.core.lock();

        core.with_bus("join federation", |bus| {
            bus.join(&config.federation_name, &config.federate_name, &config.fom_file)
        })?;
        core.with_bus("enable time management", |bus| {
            bus.enable_time_management(config.lookahead)
        })?;
        core.with_bus("subscribe federate objects", |bus| {
            bus.subscribe_federate_objects()
        })?;
        core.declare_classes(
            &self.shared.published_classes,
            &self.shared.subscribed_classes,
        )?;
        for label in [READY_TO_POPULATE, READY_TO_RUN] {
            core.with_bus("register sync point", |bus| bus.register_sync_point(label))?;
        }
        info!(federation = %config.federation_name, "Joined federation");
        Ok(())
    }

    fn wait_for_join(&self) -> Result<(), FederationError> {
        {
            let mut core = self.shared.core.lock();
            core.membership.begin_join_phase();
            let pending = core.membership.pending_join();
            if !pending.is_empty() {
                info!(pending = ?pending, "Waiting for federates to join");
            }
        }
        self.shared
            .poll_until("waiting for federates to join", |core| {
                core.membership.is_join_complete()
            })?;
        info!("All expected federates joined");
        Ok(())
    }

    fn barrier(&self, label: &str) -> Result<(), FederationError> {
        self.shared
            .core
            .lock()
            .with_bus("achieve sync point", |bus| bus.achieve_sync_point(label))?;
        info!(label, "Waiting for sync point");
        self.shared
            .poll_until(label, |core| core.is_sync_point_achieved(label))
    }

    fn wait_for_start_gate(&self) -> Result<(), FederationError> {
        if self.shared.config.auto_start {
            return Ok(());
        }
        info!("Waiting for resume() to start the federation");
        self.shared.poll_until("waiting for manual start", |_| {
            self.shared.flags.start_released.load(Ordering::SeqCst)
        })
    }

    fn send_init_interactions(&self) {
        let mut core = self.shared.core.lock();
        for interaction in &self.shared.init_interactions {
            core.send_interaction(interaction.clone(), None, SendSource::Initialization);
        }
    }

    /// Pause a running federation; no effect in any other state
    pub fn pause(&self) -> Result<bool, FederationError> {
        self.shared.pause()
    }

    /// Resume a paused federation, or release the manual start gate
    pub fn resume(&self) -> Result<bool, FederationError> {
        let shared = &self.shared;
        let state = shared.core.lock().state();
        match state {
            FederationState::Initialized => {
                if shared.config.auto_start
                    || shared.flags.start_released.swap(true, Ordering::SeqCst)
                {
                    return Ok(false);
                }
                info!(session = %shared.session_id, "Manual start released");
                Ok(true)
            }
            FederationState::Paused => {
                let resumed = shared.transition_from(
                    FederationState::Paused,
                    FederationState::Running,
                    |core| {
                        core.time.anchor_wall_clock(Instant::now());
                        shared.flags.paused.store(false, Ordering::SeqCst);
                    },
                )?;
                if resumed {
                    info!(session = %shared.session_id, "Federation resumed");
                }
                Ok(resumed)
            }
            _ => {
                debug!(state = %state, "Resume ignored");
                Ok(false)
            }
        }
    }

    /// Request termination
    ///
    /// Before the step loop runs this only aborts startup; afterwards it
    /// starts the termination cascade.
    pub fn terminate(&self) {
        let shared = &self.shared;
        if !shared.flags.running.load(Ordering::SeqCst)
            && shared.core.lock().state() == FederationState::Initialized
        {
            shared.flags.stop_requested.store(true, Ordering::SeqCst);
            info!(session = %shared.session_id, "Termination requested before start");
            return;
        }
        begin_termination(shared, TerminationReason::Requested);
    }

    /// Wait for the step loop and the termination cascade to finish
    pub fn wait(&self) -> Result<RunSummary, FederationError> {
        let shared = &self.shared;
        let step_loop = shared.step_loop.lock().take();
        if let Some(handle) = step_loop {
            handle
                .join()
                .map_err(|_| FederationError::Aborted("step loop panicked".to_string()))?;
        }
        let terminator = shared.terminator.lock().take();
        if let Some(handle) = terminator {
            handle
                .join()
                .map_err(|_| FederationError::Aborted("termination panicked".to_string()))?;
        }

        if let Some(fatal) = shared.fatal.lock().clone() {
            return Err(FederationError::Aborted(fatal));
        }
        Ok(self.summary())
    }

    /// Figures for the run so far
    pub fn summary(&self) -> RunSummary {
        let core = self.shared.core.lock();
        RunSummary {
            session_id: self.shared.session_id,
            final_state: core.state(),
            final_time: core.time.current_time(),
            steps: core.time.steps_completed(),
            interactions_sent: core.interactions_sent(),
            send_failures: core.send_failures(),
            nodes_executed: core.coa.graph().executed_count(),
            events_logged: core.events.len(),
        }
    }
}

impl std::fmt::Debug for FederationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationManager")
            .field("session_id", &self.shared.session_id)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Pushes bus callbacks into the federation from another thread
#[derive(Clone)]
pub struct CallbackSink {
    shared: Arc<Shared>,
}

impl CallbackSink {
    pub fn deliver(&self, callback: BusCallback) {
        self.shared.core.lock().dispatch(callback);
    }
}

impl std::fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink")
            .field("session_id", &self.shared.session_id)
            .finish()
    }
}

// ============================================================================
// Step Loop
// ============================================================================

fn run_step_loop(shared: Arc<Shared>) {
    info!(session = %shared.session_id, "Step loop started");

    while shared.flags.running.load(Ordering::SeqCst) {
        let delay = shared.core.lock().time.pacing_delay(Instant::now());
        if let Some(delay) = delay {
            thread::sleep(delay);
            continue;
        }

        // Pause state and termination are read under the step lock
        let step = {
            let mut core = shared.core.lock();
            if shared.flags.termination_started.load(Ordering::SeqCst) {
                break;
            }
            if core.state() == FederationState::Paused {
                if let Err(err) = core.pump_callbacks() {
                    warn!(error = %err, "Callback pump failed while paused");
                }
                None
            } else {
                Some(core.execute_step())
            }
        };

        let requested = match step {
            None => {
                shared.sleep_poll();
                continue;
            }
            Some(Ok(requested)) => requested,
            Some(Err(err)) => {
                let reason = shared.record_fatal(&err);
                begin_termination(&shared, TerminationReason::Fatal(reason));
                break;
            }
        };

        if requested.is_some() {
            match await_grant(&shared) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let reason = shared.record_fatal(&err);
                    begin_termination(&shared, TerminationReason::Fatal(reason));
                    break;
                }
            }
        }
        if shared.flags.termination_started.load(Ordering::SeqCst) {
            break;
        }

        let due_pause = shared.core.lock().time.take_due_pause();
        if let Some(pause_time) = due_pause {
            info!(pause_time, "Scheduled pause point passed");
            if let Err(err) = shared.pause() {
                warn!(error = %err, "Scheduled pause rejected");
            }
        }

        let pending = {
            let mut core = shared.core.lock();
            if core.time.is_past_end_time() {
                core.request_termination(TerminationReason::EndTimeReached);
            }
            core.take_pending_termination()
        };
        if let Some(reason) = pending {
            begin_termination(&shared, reason);
        }
    }

    info!(session = %shared.session_id, "Step loop stopped");
}

/// Poll until the outstanding request is granted
///
/// Returns `Ok(false)` if the running flag dropped first. Membership and
/// other structural errors end the wait; transient ones are polled through.
fn await_grant(shared: &Shared) -> Result<bool, BusError> {
    let mut empty_polls: u64 = 0;
    loop {
        if !shared.flags.running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        {
            let mut core = shared.core.lock();
            match core.pump_callbacks() {
                Ok(_) => {}
                Err(err) if err.is_transient() => {
                    debug!(error = %err, "Transient error while awaiting grant");
                }
                Err(err) => return Err(err),
            }
            if core.time.is_granted() {
                return Ok(true);
            }
        }

        empty_polls += 1;
        if let Some(threshold) = shared.config.stuck_poll_threshold {
            if empty_polls % threshold == 0 {
                warn!(
                    polls = empty_polls,
                    "Time grant overdue; a federate may be stuck"
                );
            }
        }
        shared.sleep_poll();
    }
}

// ============================================================================
// Termination Cascade
// ============================================================================

/// Start the termination cascade once; later calls are ignored
fn begin_termination(shared: &Arc<Shared>, reason: TerminationReason) {
    if shared.flags.termination_started.swap(true, Ordering::SeqCst) {
        debug!(reason = %reason, "Termination already in progress");
        return;
    }
    info!(session = %shared.session_id, reason = %reason, "Terminating federation");
    let end_timestamp = shared.core.lock().note_termination(&reason);

    let cascade_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("federation-terminator".to_string())
        .spawn(move || run_termination(cascade_shared, reason, end_timestamp));
    match spawned {
        Ok(handle) => *shared.terminator.lock() = Some(handle),
        Err(err) => {
            error!(error = %err, "Failed to spawn terminator; stopping step loop");
            shared.flags.running.store(false, Ordering::SeqCst);
        }
    }
}

/// `end_timestamp` is the send time at the instant termination began
fn run_termination(shared: Arc<Shared>, reason: TerminationReason, end_timestamp: f64) {
    let grace = shared.config.grace_period();

    {
        let mut core = shared.core.lock();
        let end = Interaction::new(shared.config.end_interaction_class.clone());
        core.send_interaction(end, Some(end_timestamp), SendSource::EndOfSimulation);
    }
    thread::sleep(grace);

    shared.flags.running.store(false, Ordering::SeqCst);
    thread::sleep(grace);

    settle_final_state(&shared, &reason);
    resign(&shared);

    shared.flags.terminated.store(true, Ordering::SeqCst);
    info!(session = %shared.session_id, "Federation terminated");
}

fn settle_final_state(shared: &Shared, reason: &TerminationReason) {
    let transition = {
        let mut core = shared.core.lock();
        let from = core.state();
        let target = reason.target_state();
        let next = if from.can_transition_to(target) {
            Some(target)
        } else if from.can_transition_to(FederationState::Terminated) {
            Some(FederationState::Terminated)
        } else {
            None
        };
        match next.map(|to| core.transition(to).map(|_| (from, to))) {
            Some(Ok(pair)) => Some(pair),
            Some(Err(err)) => {
                warn!(error = %err, "Final state transition rejected");
                None
            }
            None => {
                debug!(state = %from, "No final transition from state");
                None
            }
        }
    };
    shared.flags.paused.store(false, Ordering::SeqCst);
    if let Some((from, to)) = transition {
        shared.notify(from, to);
    }
}

/// Resign barrier, then resign; force the federation down if federates
/// are still present when the timeout expires
fn resign(shared: &Shared) {
    let deadline = Instant::now() + shared.config.resign_timeout();
    {
        let mut core = shared.core.lock();
        core.membership.begin_resign_phase();
        let pending = core.membership.pending_resign();
        if !pending.is_empty() {
            info!(pending = ?pending, "Waiting for federates to resign");
        }
    }

    let complete = loop {
        {
            let mut core = shared.core.lock();
            if let Err(err) = core.pump_callbacks() {
                warn!(error = %err, "Callback pump failed during resign barrier");
                break core.membership.is_resign_complete();
            }
            if core.membership.is_resign_complete() {
                break true;
            }
        }
        if Instant::now() >= deadline {
            break false;
        }
        shared.sleep_poll();
    };

    let mut core = shared.core.lock();
    if let Err(err) = core.with_bus("resign", |bus| bus.resign()) {
        error!(error = %err, "Resign failed");
    }
    if !complete {
        warn!(pending = ?core.membership.pending_resign(), "Federates still present; forcing federation termination");
        if let Err(err) = core.with_bus("force terminate federation", |bus| {
            bus.force_terminate_federation()
        }) {
            error!(error = %err, "Forced federation termination failed");
        }
    }
}

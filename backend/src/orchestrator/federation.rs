//! Shared federation state
//!
//! [`FederationCore`] owns every piece of mutable state the step loop and
//! bus callbacks both touch: the bus handle, class registry, lifecycle
//! state, clock, membership, correlator, scheduler, COA and the logs. The
//! manager keeps it behind one mutex; a step body (scheduler emission, COA
//! pass, time-advance request) runs entirely under that lock, and callback
//! dispatch takes the same lock.

use crate::bus::{BusCallback, BusError, InteractionRegistry, RetryPolicy, RtiBus};
use crate::coa::{CoaEffect, CoaExecutor};
use crate::config::FederationConfig;
use crate::core::state::{FederationState, LifecycleError, StateMachine};
use crate::core::time::TimeManager;
use crate::events::ScenarioScheduler;
use crate::models::correlator::InteractionCorrelator;
use crate::models::event::{EventLog, FederationEvent, SendSource};
use crate::models::interaction::Interaction;
use crate::models::membership::{FederateMembership, MembershipEvent};
use crate::models::monitor::MonitorLog;
use crate::rng::RngManager;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Why the federation is ending
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// `terminate()` was called
    Requested,
    /// Federation end time exceeded
    EndTimeReached,
    /// No COA node can fire any more
    CoaFinished,
    /// A COA Action targeted the end-of-simulation class
    EndAction { node_id: String },
    /// Unrecoverable bus failure in the step loop
    Fatal(String),
}

impl TerminationReason {
    /// Lifecycle state the federation should end in
    pub fn target_state(&self) -> FederationState {
        match self {
            TerminationReason::Requested | TerminationReason::Fatal(_) => {
                FederationState::Terminated
            }
            TerminationReason::EndTimeReached
            | TerminationReason::CoaFinished
            | TerminationReason::EndAction { .. } => FederationState::Finished,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Requested => write!(f, "termination requested"),
            TerminationReason::EndTimeReached => write!(f, "federation end time reached"),
            TerminationReason::CoaFinished => write!(f, "COA finished"),
            TerminationReason::EndAction { node_id } => {
                write!(f, "end action {}", node_id)
            }
            TerminationReason::Fatal(msg) => write!(f, "fatal error: {}", msg),
        }
    }
}

/// Everything guarded by the federation lock
pub struct FederationCore {
    pub(crate) bus: Box<dyn RtiBus>,
    pub(crate) retry: RetryPolicy,
    pub(crate) registry: InteractionRegistry,
    pub(crate) lifecycle: StateMachine,
    pub(crate) time: TimeManager,
    pub(crate) membership: FederateMembership,
    pub(crate) correlator: InteractionCorrelator,
    pub(crate) scheduler: ScenarioScheduler,
    pub(crate) coa: CoaExecutor,
    pub(crate) rng: RngManager,
    pub(crate) monitor: MonitorLog,
    pub(crate) events: EventLog,
    federate_name: String,
    federation_name: String,
    terminate_on_coa_finish: bool,
    achieved_sync_points: HashSet<String>,
    pending_termination: Option<TerminationReason>,
    interactions_sent: u64,
    send_failures: u64,
}

impl FederationCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &FederationConfig,
        bus: Box<dyn RtiBus>,
        time: TimeManager,
        membership: FederateMembership,
        scheduler: ScenarioScheduler,
        coa: CoaExecutor,
        monitor: MonitorLog,
    ) -> Self {
        Self {
            bus,
            retry: RetryPolicy::new(config.retry_delay()),
            registry: InteractionRegistry::new(),
            lifecycle: StateMachine::new(),
            time,
            membership,
            correlator: InteractionCorrelator::new(),
            scheduler,
            coa,
            rng: RngManager::new(config.seed),
            monitor,
            events: EventLog::new(),
            federate_name: config.federate_name.clone(),
            federation_name: config.federation_name.clone(),
            terminate_on_coa_finish: config.terminate_on_coa_finish,
            achieved_sync_points: HashSet::new(),
            pending_termination: None,
            interactions_sent: 0,
            send_failures: 0,
        }
    }

    pub fn state(&self) -> FederationState {
        self.lifecycle.state()
    }

    pub fn interactions_sent(&self) -> u64 {
        self.interactions_sent
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    pub fn is_sync_point_achieved(&self, label: &str) -> bool {
        self.achieved_sync_points.contains(label)
    }

    /// Apply a validated transition and record it
    pub(crate) fn transition(
        &mut self,
        next: FederationState,
    ) -> Result<FederationState, LifecycleError> {
        let from = self.lifecycle.transition(next)?;
        let time = self.time.current_time();
        info!(time, from = %from, to = %next, "Federation state changed");
        self.events.log(FederationEvent::StateChanged {
            time,
            from,
            to: next,
        });
        Ok(from)
    }

    /// Route one bus callback to the component that owns it
    pub fn dispatch(&mut self, callback: BusCallback) {
        let time = self.time.current_time();
        match callback {
            BusCallback::ObjectDiscovered {
                object,
                class_name,
                name,
            } => {
                debug!(%object, class = %class_name, name = %name, "Object discovered");
                self.membership.on_discovered(object, &name);
            }

            BusCallback::AttributesUpdated { object, attributes } => {
                if let Some(MembershipEvent::Joined { role, object }) =
                    self.membership.on_attributes_updated(object, &attributes)
                {
                    self.events
                        .log(FederationEvent::FederateJoined { time, role, object });
                }
            }

            BusCallback::ObjectRemoved { object } => {
                if let Some(MembershipEvent::Resigned { role, object }) =
                    self.membership.on_removed(object)
                {
                    self.events
                        .log(FederationEvent::FederateResigned { time, role, object });
                }
            }

            BusCallback::InteractionReceived {
                class,
                interaction,
                timestamp,
            } => {
                let arrival = timestamp.unwrap_or(time);
                debug!(time = arrival, class = %interaction.class, "Interaction received");
                self.monitor.observe(arrival, &interaction);
                self.correlator.record(class, arrival, interaction);
            }

            BusCallback::TimeGranted { time: granted } => {
                debug!(time = granted, "Time advance granted");
                self.time.grant(granted);
            }

            BusCallback::SyncPointAchieved { label } => {
                info!(time, label = %label, "Sync point achieved");
                self.events.log(FederationEvent::SyncPointAchieved {
                    time,
                    label: label.clone(),
                });
                self.achieved_sync_points.insert(label);
            }
        }
    }

    /// Drain and dispatch every callback the bus has queued
    pub fn pump_callbacks(&mut self) -> Result<usize, BusError> {
        let callbacks = self.bus.evoke_callbacks()?;
        let count = callbacks.len();
        for callback in callbacks {
            self.dispatch(callback);
        }
        Ok(count)
    }

    /// Stamp, publish (once) and send an interaction
    ///
    /// Transient failures are retried; any other failure is logged and the
    /// interaction counts as consumed. Returns whether the send succeeded.
    pub fn send_interaction(
        &mut self,
        mut interaction: Interaction,
        timestamp: Option<f64>,
        source: SendSource,
    ) -> bool {
        interaction.stamp_origin(&self.federate_name, &self.federation_name);
        let time = self.time.current_time();

        let result = self
            .registry
            .publish(self.bus.as_mut(), &self.retry, &interaction.class)
            .and_then(|handle| {
                self.retry.run("send interaction", || {
                    self.bus.send_interaction(handle, &interaction, timestamp)
                })
            });

        match result {
            Ok(()) => {
                self.interactions_sent += 1;
                info!(time, class = %interaction.class, timestamp = ?timestamp, "Interaction sent");
                self.events.log(FederationEvent::InteractionSent {
                    time,
                    class: interaction.class,
                    timestamp,
                    source,
                });
                true
            }
            Err(err) => {
                self.send_failures += 1;
                error!(time, class = %interaction.class, error = %err, "Failed to send interaction");
                false
            }
        }
    }

    /// One step body: scheduled sends, a COA pass, then the advance request
    ///
    /// Returns the requested time, or `None` when the pass queued a
    /// termination. No advance is requested in that case so the clock stays
    /// at the instant the run ended.
    pub fn execute_step(&mut self) -> Result<Option<f64>, BusError> {
        let now = self.time.current_time();

        let emission = self
            .scheduler
            .emit_due(now, self.time.lookahead(), self.time.step());
        for missed in emission.missed {
            self.events.log(FederationEvent::ScheduleMissed {
                time: now,
                scheduled_time: missed.time,
                class: missed.interaction.class,
            });
        }
        for injection in emission.due {
            self.send_interaction(injection.interaction, Some(injection.time), SendSource::Script);
        }

        let pass = self
            .coa
            .advance(now, &mut self.correlator, &mut self.rng);
        for executed in &pass.executed {
            self.events.log(FederationEvent::NodeExecuted {
                time: now,
                node_id: executed.node_id.clone(),
                kind: executed.kind.to_string(),
            });
        }
        for effect in pass.effects {
            match effect {
                CoaEffect::Send {
                    node_id,
                    interaction,
                } => {
                    let timestamp = self.time.send_time();
                    self.send_interaction(interaction, Some(timestamp), SendSource::Action { node_id });
                }
                CoaEffect::Terminate { node_id } => {
                    self.request_termination(TerminationReason::EndAction { node_id });
                }
            }
        }
        if pass.exhausted && self.terminate_on_coa_finish {
            self.request_termination(TerminationReason::CoaFinished);
        }
        if self.pending_termination.is_some() {
            return Ok(None);
        }

        let target = self.time.begin_request();
        let bus = &mut self.bus;
        self.retry
            .run("time advance request", || bus.request_time_advance(target))?;
        Ok(Some(target))
    }

    /// Queue a termination for the step loop; the first reason wins
    pub(crate) fn request_termination(&mut self, reason: TerminationReason) {
        if self.pending_termination.is_none() {
            debug!(reason = %reason, "Termination queued");
            self.pending_termination = Some(reason);
        }
    }

    pub(crate) fn take_pending_termination(&mut self) -> Option<TerminationReason> {
        self.pending_termination.take()
    }

    /// Run `op` against the bus with the transient-error retry policy
    pub(crate) fn with_bus<T>(
        &mut self,
        operation: &str,
        mut op: impl FnMut(&mut dyn RtiBus) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let bus = &mut self.bus;
        self.retry.run(operation, || op(bus.as_mut()))
    }

    /// Resolve every class the run needs before the federation starts
    ///
    /// Classes the manager sends are published and monitored classes are
    /// subscribed. A COA node whose class cannot be resolved is disabled
    /// instead of failing the load.
    pub(crate) fn declare_classes(
        &mut self,
        published: &[String],
        subscribed: &[String],
    ) -> Result<(), BusError> {
        for class in published {
            self.registry
                .publish(self.bus.as_mut(), &self.retry, class)?;
        }
        for class in subscribed {
            self.registry
                .subscribe(self.bus.as_mut(), &self.retry, class)?;
        }

        for binding in self.coa.class_bindings() {
            let resolved = if binding.publish {
                self.registry
                    .publish(self.bus.as_mut(), &self.retry, &binding.class)
            } else {
                self.registry
                    .subscribe(self.bus.as_mut(), &self.retry, &binding.class)
            };
            let outcome = match resolved {
                Ok(handle) => self.coa.bind_class(&binding.node_id, handle),
                Err(err) => {
                    error!(
                        node_id = %binding.node_id,
                        class = %binding.class,
                        error = %err,
                        "Cannot resolve COA node class; node disabled"
                    );
                    self.coa.disable(&binding.node_id)
                }
            };
            if let Err(err) = outcome {
                warn!(node_id = %binding.node_id, error = %err, "COA binding failed");
            }
        }
        Ok(())
    }

    /// Log that the termination cascade started
    ///
    /// Returns the end-of-simulation timestamp for the current instant.
    pub(crate) fn note_termination(&mut self, reason: &TerminationReason) -> f64 {
        let time = self.time.current_time();
        self.events.log(FederationEvent::TerminationRequested {
            time,
            reason: reason.to_string(),
        });
        self.time.send_time()
    }
}

impl fmt::Debug for FederationCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationCore")
            .field("state", &self.lifecycle.state())
            .field("time", &self.time.current_time())
            .field("interactions_sent", &self.interactions_sent)
            .field("events", &self.events.len())
            .finish()
    }
}

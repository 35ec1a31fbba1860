//! End-to-end federation manager runs against the loopback bus
//!
//! Each test uses short grace windows and poll intervals so the full
//! startup -> step loop -> termination cascade completes quickly.

use federation_manager_core_rs::bus::{BusCallback, BusError, LoopbackBus, LoopbackProbe, RtiBus};
use federation_manager_core_rs::coa::{CoaEdge, FilterRegistry, NodeKind, NodeSpec};
use federation_manager_core_rs::models::event::{FederationEvent, SendSource};
use federation_manager_core_rs::models::interaction::{FEDERATION_NAME_PARAM, SOURCE_FED_PARAM};
use federation_manager_core_rs::orchestrator::{READY_TO_POPULATE, READY_TO_RUN};
use federation_manager_core_rs::scenario::CoaDescriptor;
use federation_manager_core_rs::{
    ClassHandle, ExpectedFederate, FederationConfig, FederationError, FederationManager,
    FederationState, Interaction, ScenarioDescriptor, ScriptedInjection,
};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> FederationConfig {
    let mut config = FederationConfig::new("Test", "fom.xml", "scenario.json", 1.0, 0.1);
    config.grace_period_ms = 20;
    config.poll_interval_ms = 1;
    config.retry_delay_ms = 1;
    config.resign_timeout_ms = 200;
    config
}

fn pong_peer() -> Vec<ExpectedFederate> {
    vec![ExpectedFederate::new("Pong", 1)]
}

fn scenario_with(expected: Vec<ExpectedFederate>, nodes: Vec<NodeSpec>, edges: Vec<CoaEdge>) -> ScenarioDescriptor {
    ScenarioDescriptor {
        expected_federates: expected,
        coa: CoaDescriptor { nodes, edges },
        ..Default::default()
    }
}

fn manager_with(
    config: FederationConfig,
    scenario: &ScenarioDescriptor,
) -> (FederationManager, LoopbackProbe) {
    let bus = LoopbackBus::new().with_peers(&scenario.expected_federates);
    let probe = bus.probe();
    let manager =
        FederationManager::new(config, scenario, FilterRegistry::new(), Box::new(bus)).unwrap();
    (manager, probe)
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn action(id: &str, class: &str) -> NodeSpec {
    NodeSpec::new(
        id,
        NodeKind::Action {
            class: class.to_string(),
            parameters: Default::default(),
        },
    )
}

fn outcome(id: &str, class: &str) -> NodeSpec {
    NodeSpec::new(
        id,
        NodeKind::Outcome {
            class: class.to_string(),
        },
    )
}

/// The end-of-simulation message is the final send and carries `timestamp`
fn assert_end_message_last(probe: &LoopbackProbe, timestamp: f64) {
    let sent = probe.sent();
    let last = sent.last().unwrap();
    assert_eq!(last.interaction.class, "SimEnd");
    assert!((last.timestamp.unwrap() - timestamp).abs() < 1e-9);
    assert_eq!(probe.sent_of_class("SimEnd").len(), 1);
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_startup_sequence_and_init_interactions() {
    let mut scenario = scenario_with(pong_peer(), vec![], vec![]);
    scenario.init_interactions = vec![Interaction::new("Configure").with_parameter("mode", json!("fast"))];
    let (manager, probe) = manager_with(fast_config(), &scenario);

    assert!(manager.start().unwrap());
    assert_eq!(manager.state(), FederationState::Running);
    assert_eq!(
        probe.joined_as(),
        Some(("Test".to_string(), "FederationManager".to_string()))
    );
    assert!(probe.is_time_managed());
    assert_eq!(probe.registered_sync_points(), vec![READY_TO_POPULATE, READY_TO_RUN]);
    assert_eq!(probe.achieved_sync_points(), vec![READY_TO_POPULATE, READY_TO_RUN]);

    let init = probe.sent_of_class("Configure");
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].timestamp, None, "initialization is receive-ordered");

    let log = manager.event_log();
    assert_eq!(log.events_of_type("FederateJoined").len(), 1);
    assert_eq!(log.events_of_type("SyncPointAchieved").len(), 2);

    manager.terminate();
    manager.wait().unwrap();
}

#[test]
fn test_start_twice_is_noop() {
    let (manager, _probe) = manager_with(fast_config(), &ScenarioDescriptor::default());
    assert!(manager.start().unwrap());
    assert!(!manager.start().unwrap());
    manager.terminate();
    manager.wait().unwrap();
}

#[test]
fn test_terminate_during_join_wait_aborts_startup() {
    let scenario = scenario_with(pong_peer(), vec![], vec![]);
    // No simulated peers: the join wait never completes on its own
    let manager = Arc::new(
        FederationManager::new(
            fast_config(),
            &scenario,
            FilterRegistry::new(),
            Box::new(LoopbackBus::new()),
        )
        .unwrap(),
    );

    let starter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.start())
    };
    thread::sleep(Duration::from_millis(20));
    manager.terminate();

    let result = starter.join().unwrap();
    assert!(matches!(result, Err(FederationError::Aborted(_))));
    assert_eq!(manager.state(), FederationState::Initialized);
}

#[test]
fn test_manual_start_gate_released_by_resume() {
    let mut config = fast_config();
    config.auto_start = false;
    let (manager, probe) = manager_with(config, &ScenarioDescriptor::default());
    let manager = Arc::new(manager);

    let transitions = Arc::new(Mutex::new(Vec::new()));
    {
        let transitions = Arc::clone(&transitions);
        manager.on_state_change(move |from, to| transitions.lock().unwrap().push((from, to)));
    }

    let starter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.start())
    };

    assert!(wait_until(Duration::from_secs(2), || probe
        .achieved_sync_points()
        .contains(&READY_TO_POPULATE.to_string())));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(manager.state(), FederationState::Initialized);
    assert!(!probe.achieved_sync_points().contains(&READY_TO_RUN.to_string()));

    assert!(manager.resume().unwrap());
    assert!(starter.join().unwrap().unwrap());
    assert_eq!(manager.state(), FederationState::Running);

    manager.terminate();
    let summary = manager.wait().unwrap();
    assert_eq!(summary.final_state, FederationState::Terminated);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (FederationState::Initialized, FederationState::Running),
            (FederationState::Running, FederationState::Terminated),
        ]
    );
}

// ============================================================================
// Step Loop
// ============================================================================

#[test]
fn test_ping_pong_outcome_fires_at_arrival_step() {
    let mut config = fast_config();
    config.terminate_on_coa_finish = true;
    let scenario = scenario_with(
        pong_peer(),
        vec![action("ping", "Ping"), outcome("pong", "Pong")],
        vec![CoaEdge::flow("ping", "pong")],
    );
    let (manager, probe) = manager_with(config, &scenario);
    probe.deliver_interaction_at(3.0, Interaction::new("Pong"));

    manager.start().unwrap();
    let summary = manager.wait().unwrap();

    let log = manager.event_log();
    assert_eq!(log.node_execution_time("ping"), Some(0.0));
    assert_eq!(log.node_execution_time("pong"), Some(3.0));
    assert_eq!(summary.final_state, FederationState::Finished);
    assert_eq!(summary.nodes_executed, 2);
    assert_eq!(summary.final_time, 3.0);
    assert_eq!(probe.time_requests(), vec![1.0, 2.0, 3.0]);
    assert_end_message_last(&probe, 3.10001);

    let pings = probe.sent_of_class("Ping");
    assert_eq!(pings.len(), 1);
    let timestamp = pings[0].timestamp.unwrap();
    assert!((timestamp - 0.10001).abs() < 1e-9);
    assert_eq!(
        pings[0].interaction.parameter(SOURCE_FED_PARAM),
        Some(&json!("FederationManager"))
    );
    assert_eq!(
        pings[0].interaction.parameter(FEDERATION_NAME_PARAM),
        Some(&json!("Test"))
    );
}

#[test]
fn test_scripted_interaction_sent_once_with_its_timestamp() {
    let mut config = fast_config();
    config.federation_end_time = Some(8.0);
    let mut scenario = ScenarioDescriptor::default();
    scenario.scripted_interactions = vec![ScriptedInjection::new(
        5.0,
        Interaction::new("Ping").with_parameter("sequence", json!(1)),
    )];
    let (manager, probe) = manager_with(config, &scenario);

    manager.start().unwrap();
    let summary = manager.wait().unwrap();

    let pings = probe.sent_of_class("Ping");
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0].timestamp, Some(5.0));
    assert_eq!(summary.final_state, FederationState::Finished);

    let sent = manager.event_log();
    let scripted: Vec<_> = sent
        .sends_of_class("Ping")
        .into_iter()
        .filter(|e| matches!(e, FederationEvent::InteractionSent { source: SendSource::Script, .. }))
        .collect();
    assert_eq!(scripted.len(), 1);
    assert_eq!(scripted[0].time(), 4.0);
}

#[test]
fn test_end_time_exceeded_finishes_run() {
    let mut config = fast_config();
    config.federation_end_time = Some(3.0);
    config.grace_period_ms = 100;
    let mut scenario = ScenarioDescriptor::default();
    scenario.scripted_interactions = vec![ScriptedInjection::new(50.0, Interaction::new("Late"))];
    let (manager, probe) = manager_with(config, &scenario);

    manager.start().unwrap();
    let summary = manager.wait().unwrap();

    assert_eq!(summary.final_state, FederationState::Finished);
    assert_eq!(summary.final_time, 4.0);
    assert_eq!(summary.steps, 4);
    assert_eq!(probe.time_requests(), vec![1.0, 2.0, 3.0, 4.0]);
    assert!(probe.sent_of_class("Late").is_empty(), "no steps after the end time");
    assert_end_message_last(&probe, 4.10001);
}

#[test]
fn test_scheduled_pause_holds_clock_until_resume() {
    let mut scenario = ScenarioDescriptor::default();
    scenario.pause_times = vec![2.0];
    let (manager, _probe) = manager_with(fast_config(), &scenario);

    manager.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || manager.is_paused()));
    assert_eq!(manager.state(), FederationState::Paused);

    let held = manager.current_time();
    assert_eq!(held, 3.0, "pause taken once the clock exceeds 2.0");
    thread::sleep(Duration::from_millis(20));
    assert_eq!(manager.current_time(), held);

    assert!(manager.resume().unwrap());
    assert!(wait_until(Duration::from_secs(2), || manager.current_time() > held));
    assert_eq!(manager.state(), FederationState::Running);

    manager.terminate();
    assert_eq!(manager.wait().unwrap().final_state, FederationState::Terminated);
}

#[test]
fn test_no_step_starts_after_pause_returns() {
    let (manager, probe) = manager_with(fast_config(), &ScenarioDescriptor::default());
    manager.start().unwrap();

    for _ in 0..25 {
        assert!(manager.pause().unwrap());
        let requests = probe.time_requests().len();
        thread::sleep(Duration::from_millis(2));
        assert_eq!(probe.time_requests().len(), requests);
        assert!(manager.resume().unwrap());
    }

    manager.terminate();
    manager.wait().unwrap();
}

#[test]
fn test_pause_and_resume_ignored_outside_running() {
    let (manager, _probe) = manager_with(fast_config(), &ScenarioDescriptor::default());
    assert!(!manager.pause().unwrap());

    manager.start().unwrap();
    assert!(!manager.resume().unwrap(), "already running");
    assert!(manager.pause().unwrap());
    assert!(!manager.pause().unwrap());
    assert!(manager.resume().unwrap());

    manager.terminate();
    manager.wait().unwrap();
}

#[test]
fn test_monitor_log_records_monitored_arrivals() {
    let mut config = fast_config();
    config.federation_end_time = Some(4.0);
    let mut scenario = ScenarioDescriptor::default();
    scenario.monitored_classes = vec!["Pong".to_string()];
    let (manager, probe) = manager_with(config, &scenario);
    let buffer = SharedBuffer::default();
    let manager = manager.with_monitor_sink(Box::new(buffer.clone()));

    probe.deliver_interaction_at(2.0, Interaction::new("Pong").with_parameter("sequence", json!(4)));
    probe.deliver_interaction_at(2.0, Interaction::new("Noise"));

    manager.start().unwrap();
    manager.wait().unwrap();

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert_eq!(output, "time=2.000000 class=Pong sequence=4\n");
    assert_eq!(probe.subscribe_calls("Pong"), 1);
}

#[test]
fn test_transient_send_failures_retried() {
    let mut scenario = ScenarioDescriptor::default();
    scenario.init_interactions = vec![Interaction::new("Configure")];
    let (manager, probe) = manager_with(fast_config(), &scenario);
    probe.fail_next_sends(3);

    manager.start().unwrap();
    assert_eq!(probe.sent_of_class("Configure").len(), 1);

    manager.terminate();
    let summary = manager.wait().unwrap();
    assert_eq!(summary.send_failures, 0);
}

#[test]
fn test_unresolvable_coa_class_disables_node() {
    let scenario = scenario_with(
        vec![],
        vec![action("ping", "Ping"), outcome("ghost", "Ghost")],
        vec![],
    );
    let bus = LoopbackBus::new().with_defined_classes(["Ping", "SimEnd"]);
    let probe = bus.probe();
    let mut config = fast_config();
    config.federation_end_time = Some(2.0);
    let manager =
        FederationManager::new(config, &scenario, FilterRegistry::new(), Box::new(bus)).unwrap();

    manager.start().unwrap();
    manager.wait().unwrap();

    assert!(manager.coa_node("ghost").unwrap().disabled);
    assert!(!manager.coa_node("ghost").unwrap().is_executed());
    assert!(manager.coa_node("ping").unwrap().is_executed());
    assert_eq!(probe.sent_of_class("Ping").len(), 1);
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn test_termination_cascade_sends_one_end_message_and_resigns() {
    let mut config = fast_config();
    config.grace_period_ms = 50;
    let mut scenario = scenario_with(pong_peer(), vec![], vec![]);
    scenario.scripted_interactions = (1..100_000)
        .map(|t| ScriptedInjection::new(t as f64, Interaction::new("Tick")))
        .collect();
    let (manager, probe) = manager_with(config, &scenario);
    manager.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || manager.current_time() >= 2.0));

    manager.terminate();
    manager.terminate();
    let summary = manager.wait().unwrap();

    // Stamped no later than the clock reached; nothing follows it
    let end = probe.sent_of_class("SimEnd");
    assert_eq!(end.len(), 1);
    let end_timestamp = end[0].timestamp.unwrap();
    assert!(end_timestamp <= summary.final_time + 0.10001 + 1e-9);
    assert_eq!(probe.sent().last().unwrap().interaction.class, "SimEnd");
    // Scripted sends run at most one step ahead of the clock
    assert!(probe
        .sent_of_class("Tick")
        .iter()
        .all(|tick| tick.timestamp.unwrap() < end_timestamp + 1.0));
    assert!(!manager.is_running());
    assert!(manager.is_terminated());
    assert!(probe.resigned());
    assert!(!probe.force_terminated(), "peer resigned within the timeout");
    assert_eq!(summary.final_state, FederationState::Terminated);

    let log = manager.event_log();
    assert_eq!(log.events_of_type("TerminationRequested").len(), 1);
    assert_eq!(log.events_of_type("FederateResigned").len(), 1);
}

#[test]
fn test_lingering_federate_forces_federation_down() {
    let mut config = fast_config();
    config.resign_timeout_ms = 30;
    let scenario = scenario_with(pong_peer(), vec![], vec![]);
    // Peers only leave on a class the manager never sends
    let bus = LoopbackBus::new()
        .with_peers(&scenario.expected_federates)
        .with_end_class("NeverSent");
    let probe = bus.probe();
    let manager =
        FederationManager::new(config, &scenario, FilterRegistry::new(), Box::new(bus)).unwrap();

    manager.start().unwrap();
    manager.terminate();
    manager.wait().unwrap();

    assert!(probe.resigned());
    assert!(probe.force_terminated());
}

#[test]
fn test_end_class_action_terminates_instead_of_sending() {
    let scenario = scenario_with(
        vec![],
        vec![
            NodeSpec::new("wait", NodeKind::Duration { length: 2.0 }),
            action("stop", "SimEnd"),
        ],
        vec![CoaEdge::flow("wait", "stop")],
    );
    let (manager, probe) = manager_with(fast_config(), &scenario);

    manager.start().unwrap();
    let summary = manager.wait().unwrap();

    assert_eq!(summary.final_state, FederationState::Finished);
    assert_eq!(manager.event_log().node_execution_time("stop"), Some(2.0));
    assert_eq!(summary.final_time, 2.0);
    assert_eq!(probe.time_requests(), vec![1.0, 2.0]);
    // Only the cascade broadcasts the end class
    assert_end_message_last(&probe, 2.10001);
}

/// Loopback bus that starts failing with a membership error mid-run
struct LosesMembership {
    inner: LoopbackBus,
    requests: usize,
    fail_after: usize,
}

impl RtiBus for LosesMembership {
    fn join(&mut self, federation: &str, federate: &str, fom: &Path) -> Result<(), BusError> {
        self.inner.join(federation, federate, fom)
    }

    fn enable_time_management(&mut self, lookahead: f64) -> Result<(), BusError> {
        self.inner.enable_time_management(lookahead)
    }

    fn subscribe_federate_objects(&mut self) -> Result<(), BusError> {
        self.inner.subscribe_federate_objects()
    }

    fn interaction_class(&mut self, name: &str) -> Result<ClassHandle, BusError> {
        self.inner.interaction_class(name)
    }

    fn publish_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError> {
        self.inner.publish_interaction_class(class)
    }

    fn subscribe_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError> {
        self.inner.subscribe_interaction_class(class)
    }

    fn send_interaction(
        &mut self,
        class: ClassHandle,
        interaction: &Interaction,
        timestamp: Option<f64>,
    ) -> Result<(), BusError> {
        self.inner.send_interaction(class, interaction, timestamp)
    }

    fn register_sync_point(&mut self, label: &str) -> Result<(), BusError> {
        self.inner.register_sync_point(label)
    }

    fn achieve_sync_point(&mut self, label: &str) -> Result<(), BusError> {
        self.inner.achieve_sync_point(label)
    }

    fn request_time_advance(&mut self, time: f64) -> Result<(), BusError> {
        self.requests += 1;
        self.inner.request_time_advance(time)
    }

    fn evoke_callbacks(&mut self) -> Result<Vec<BusCallback>, BusError> {
        if self.requests > self.fail_after {
            return Err(BusError::FederateNotJoined("Pong".to_string()));
        }
        self.inner.evoke_callbacks()
    }

    fn resign(&mut self) -> Result<(), BusError> {
        self.inner.resign()
    }

    fn force_terminate_federation(&mut self) -> Result<(), BusError> {
        self.inner.force_terminate_federation()
    }
}

#[test]
fn test_membership_error_during_grant_wait_is_fatal() {
    let scenario = scenario_with(pong_peer(), vec![], vec![]);
    let inner = LoopbackBus::new().with_peers(&scenario.expected_federates);
    let probe = inner.probe();
    let bus = LosesMembership {
        inner,
        requests: 0,
        fail_after: 3,
    };
    let manager =
        FederationManager::new(fast_config(), &scenario, FilterRegistry::new(), Box::new(bus))
            .unwrap();

    manager.start().unwrap();
    let result = manager.wait();

    assert!(matches!(result, Err(FederationError::Aborted(ref msg)) if msg.contains("membership") && msg.contains("Pong")));
    assert_eq!(manager.state(), FederationState::Terminated);
    assert_eq!(manager.current_time(), 3.0);
    assert_eq!(probe.sent_of_class("SimEnd").len(), 1);
    assert!(probe.force_terminated());
}

//! In-process loopback bus
//!
//! Stands in for an RTI when no real infrastructure is available:
//! - time-advance requests are granted on the next callback pump
//! - sync points are achieved as soon as this federate achieves them
//! - sent interactions are recorded, not delivered anywhere
//! - scripted callbacks can be released once logical time reaches a value
//! - simulated peers join on the first pump and resign once the
//!   end-of-simulation interaction has been sent
//!
//! A [`LoopbackProbe`] shares the bus state so tests can inspect it after
//! the bus has been moved into the federation manager.

use crate::bus::error::BusError;
use crate::bus::{BusCallback, RtiBus};
use crate::models::interaction::{ClassHandle, Interaction, ObjectId};
use crate::models::membership::{ExpectedFederate, ATTR_HANDLE, ATTR_HOST, ATTR_TYPE};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Object class name the loopback reports for federate objects
pub const FEDERATE_OBJECT_CLASS: &str = "HLAobjectRoot.HLAmanager.HLAfederate";

/// First object id handed out to simulated peers
const PEER_OBJECT_BASE: u64 = 1_000;

/// An interaction the manager handed to the bus
#[derive(Debug, Clone, PartialEq)]
pub struct SentInteraction {
    pub class: String,
    pub interaction: Interaction,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone)]
struct Peer {
    object: ObjectId,
    role: String,
}

#[derive(Debug, Default)]
struct LoopbackState {
    federation: Option<String>,
    federate: Option<String>,
    time_managed: bool,
    defined_classes: Option<HashSet<String>>,
    classes: BTreeMap<String, ClassHandle>,
    publish_calls: HashMap<ClassHandle, usize>,
    subscribe_calls: HashMap<ClassHandle, usize>,
    sent: Vec<SentInteraction>,
    queue: VecDeque<BusCallback>,
    timed: Vec<(f64, BusCallback)>,
    registered_sync_points: Vec<String>,
    achieved_sync_points: Vec<String>,
    time_requests: Vec<f64>,
    pending_grant: Option<f64>,
    current_time: f64,
    peers: Vec<Peer>,
    peers_announced: bool,
    end_class: String,
    failing_sends: usize,
    resigned: bool,
    force_terminated: bool,
}

impl LoopbackState {
    fn class_name(&self, handle: ClassHandle) -> Option<&str> {
        self.classes
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(name, _)| name.as_str())
    }

    fn announce_peers(&mut self) {
        if self.peers_announced {
            return;
        }
        self.peers_announced = true;
        for peer in &self.peers {
            self.queue.push_back(BusCallback::ObjectDiscovered {
                object: peer.object,
                class_name: FEDERATE_OBJECT_CLASS.to_string(),
                name: format!("{}-{}", peer.role, peer.object.0),
            });
            let attributes = [
                (ATTR_HANDLE, peer.object.0.to_string()),
                (ATTR_TYPE, peer.role.clone()),
                (ATTR_HOST, "loopback".to_string()),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
            self.queue.push_back(BusCallback::AttributesUpdated {
                object: peer.object,
                attributes,
            });
        }
    }

    fn retire_peers(&mut self) {
        for peer in self.peers.drain(..) {
            self.queue
                .push_back(BusCallback::ObjectRemoved { object: peer.object });
        }
    }
}

/// Loopback implementation of [`RtiBus`]
///
/// # Example
/// ```
/// use federation_manager_core_rs::bus::{BusCallback, LoopbackBus, RtiBus};
///
/// let mut bus = LoopbackBus::new();
/// bus.request_time_advance(1.0).unwrap();
/// let callbacks = bus.evoke_callbacks().unwrap();
/// assert_eq!(callbacks, vec![BusCallback::TimeGranted { time: 1.0 }]);
/// ```
#[derive(Debug)]
pub struct LoopbackBus {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        let state = LoopbackState {
            end_class: "SimEnd".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Simulate peers that join on the first pump
    pub fn with_peers(self, expected: &[ExpectedFederate]) -> Self {
        {
            let mut state = self.state.lock();
            let mut next = PEER_OBJECT_BASE + state.peers.len() as u64;
            for federate in expected {
                for _ in 0..federate.count {
                    state.peers.push(Peer {
                        object: ObjectId(next),
                        role: federate.role.clone(),
                    });
                    next += 1;
                }
            }
        }
        self
    }

    /// Restrict resolvable interaction classes; others fail as undefined
    pub fn with_defined_classes<I, S>(self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().defined_classes = Some(classes.into_iter().map(Into::into).collect());
        self
    }

    /// Class whose sending makes simulated peers resign
    pub fn with_end_class(self, class: impl Into<String>) -> Self {
        self.state.lock().end_class = class.into();
        self
    }

    /// Shared handle for inspecting and driving this bus from tests
    pub fn probe(&self) -> LoopbackProbe {
        LoopbackProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RtiBus for LoopbackBus {
    fn join(&mut self, federation: &str, federate: &str, _fom: &Path) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.federation = Some(federation.to_string());
        state.federate = Some(federate.to_string());
        Ok(())
    }

    fn enable_time_management(&mut self, _lookahead: f64) -> Result<(), BusError> {
        self.state.lock().time_managed = true;
        Ok(())
    }

    fn subscribe_federate_objects(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn interaction_class(&mut self, name: &str) -> Result<ClassHandle, BusError> {
        let mut state = self.state.lock();
        if let Some(defined) = &state.defined_classes {
            if !defined.contains(name) {
                return Err(BusError::UndefinedClass(name.to_string()));
            }
        }
        let next = ClassHandle(state.classes.len() as u32 + 1);
        Ok(*state.classes.entry(name.to_string()).or_insert(next))
    }

    fn publish_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if state.class_name(class).is_none() {
            return Err(BusError::UndefinedHandle(class));
        }
        *state.publish_calls.entry(class).or_insert(0) += 1;
        Ok(())
    }

    fn subscribe_interaction_class(&mut self, class: ClassHandle) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if state.class_name(class).is_none() {
            return Err(BusError::UndefinedHandle(class));
        }
        *state.subscribe_calls.entry(class).or_insert(0) += 1;
        Ok(())
    }

    fn send_interaction(
        &mut self,
        class: ClassHandle,
        interaction: &Interaction,
        timestamp: Option<f64>,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(BusError::ConcurrentAccess);
        }
        let name = state
            .class_name(class)
            .ok_or(BusError::UndefinedHandle(class))?
            .to_string();
        if name == state.end_class {
            state.retire_peers();
        }
        state.sent.push(SentInteraction {
            class: name,
            interaction: interaction.clone(),
            timestamp,
        });
        Ok(())
    }

    fn register_sync_point(&mut self, label: &str) -> Result<(), BusError> {
        self.state
            .lock()
            .registered_sync_points
            .push(label.to_string());
        Ok(())
    }

    fn achieve_sync_point(&mut self, label: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.achieved_sync_points.push(label.to_string());
        state.queue.push_back(BusCallback::SyncPointAchieved {
            label: label.to_string(),
        });
        Ok(())
    }

    fn request_time_advance(&mut self, time: f64) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if state.resigned {
            return Err(BusError::NotExecutionMember);
        }
        state.time_requests.push(time);
        state.pending_grant = Some(time);
        Ok(())
    }

    fn evoke_callbacks(&mut self) -> Result<Vec<BusCallback>, BusError> {
        let mut state = self.state.lock();
        state.announce_peers();

        if let Some(grant) = state.pending_grant.take() {
            // Timestamp-ordered traffic up to the granted time precedes the grant.
            let mut due = Vec::new();
            state.timed.retain(|(at, callback)| {
                if *at <= grant {
                    due.push((*at, callback.clone()));
                    false
                } else {
                    true
                }
            });
            due.sort_by(|a, b| a.0.total_cmp(&b.0));
            state.queue.extend(due.into_iter().map(|(_, callback)| callback));
            state.queue.push_back(BusCallback::TimeGranted { time: grant });
            state.current_time = grant;
        }

        Ok(state.queue.drain(..).collect())
    }

    fn resign(&mut self) -> Result<(), BusError> {
        self.state.lock().resigned = true;
        Ok(())
    }

    fn force_terminate_federation(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.force_terminated = true;
        state.peers.clear();
        Ok(())
    }
}

/// Shared view of a [`LoopbackBus`]
#[derive(Debug, Clone)]
pub struct LoopbackProbe {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackProbe {
    /// Queue a callback for the next pump
    pub fn deliver(&self, callback: BusCallback) {
        self.state.lock().queue.push_back(callback);
    }

    /// Queue a callback to be released with the first grant reaching `time`
    pub fn deliver_at(&self, time: f64, callback: BusCallback) {
        self.state.lock().timed.push((time, callback));
    }

    /// Deliver an interaction by class name, timestamped at `time`
    ///
    /// The class is resolved (and allocated if needed) the same way the
    /// manager resolves it.
    pub fn deliver_interaction_at(&self, time: f64, interaction: Interaction) {
        let mut state = self.state.lock();
        let next = ClassHandle(state.classes.len() as u32 + 1);
        let class = *state
            .classes
            .entry(interaction.class.clone())
            .or_insert(next);
        state.timed.push((
            time,
            BusCallback::InteractionReceived {
                class,
                interaction,
                timestamp: Some(time),
            },
        ));
    }

    /// Make the next `count` sends fail with a transient error
    pub fn fail_next_sends(&self, count: usize) {
        self.state.lock().failing_sends = count;
    }

    pub fn sent(&self) -> Vec<SentInteraction> {
        self.state.lock().sent.clone()
    }

    pub fn sent_of_class(&self, class: &str) -> Vec<SentInteraction> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|sent| sent.class == class)
            .cloned()
            .collect()
    }

    pub fn publish_calls(&self, class: &str) -> usize {
        let state = self.state.lock();
        state
            .classes
            .get(class)
            .and_then(|handle| state.publish_calls.get(handle))
            .copied()
            .unwrap_or(0)
    }

    pub fn subscribe_calls(&self, class: &str) -> usize {
        let state = self.state.lock();
        state
            .classes
            .get(class)
            .and_then(|handle| state.subscribe_calls.get(handle))
            .copied()
            .unwrap_or(0)
    }

    pub fn registered_sync_points(&self) -> Vec<String> {
        self.state.lock().registered_sync_points.clone()
    }

    pub fn achieved_sync_points(&self) -> Vec<String> {
        self.state.lock().achieved_sync_points.clone()
    }

    pub fn time_requests(&self) -> Vec<f64> {
        self.state.lock().time_requests.clone()
    }

    pub fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    pub fn joined_as(&self) -> Option<(String, String)> {
        let state = self.state.lock();
        Some((state.federation.clone()?, state.federate.clone()?))
    }

    pub fn is_time_managed(&self) -> bool {
        self.state.lock().time_managed
    }

    pub fn resigned(&self) -> bool {
        self.state.lock().resigned
    }

    pub fn force_terminated(&self) -> bool {
        self.state.lock().force_terminated
    }
}

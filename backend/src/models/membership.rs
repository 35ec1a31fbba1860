//! Federate membership tracking
//!
//! Reconciles the set of federates the scenario expects against the
//! discovery, attribute-reflection and removal callbacks delivered by the
//! bus.
//!
//! # Critical Invariants
//!
//! 1. A federate counts as joined only once its handle, type and host
//!    attributes all carry non-empty values
//! 2. The manager's own role and configured infrastructure roles never
//!    count toward membership
//! 3. The join and resign pending sets are independent snapshots, reset
//!    when their phase begins

use crate::models::interaction::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Attribute carrying the federate's bus handle
pub const ATTR_HANDLE: &str = "FederateHandle";
/// Attribute carrying the federate's role (federate type)
pub const ATTR_TYPE: &str = "FederateType";
/// Attribute carrying the host the federate runs on
pub const ATTR_HOST: &str = "FederateHost";

fn default_count() -> usize {
    1
}

/// A federate role the scenario requires, with how many instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedFederate {
    pub role: String,
    #[serde(default = "default_count")]
    pub count: usize,
}

impl ExpectedFederate {
    pub fn new(role: impl Into<String>, count: usize) -> Self {
        Self {
            role: role.into(),
            count,
        }
    }
}

/// Membership change worth reporting to the lifecycle log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined { role: String, object: ObjectId },
    Resigned { role: String, object: ObjectId },
}

/// Partially reflected federate object
#[derive(Debug, Clone, Default)]
struct DiscoveredFederate {
    name: String,
    handle: Option<String>,
    role: Option<String>,
    host: Option<String>,
}

impl DiscoveredFederate {
    fn merge(&mut self, attributes: &HashMap<String, String>) {
        let pick = |key: &str| {
            attributes
                .get(key)
                .filter(|value| !value.trim().is_empty())
                .cloned()
        };
        if let Some(handle) = pick(ATTR_HANDLE) {
            self.handle = Some(handle);
        }
        if let Some(role) = pick(ATTR_TYPE) {
            self.role = Some(role);
        }
        if let Some(host) = pick(ATTR_HOST) {
            self.host = Some(host);
        }
    }

    fn is_complete(&self) -> bool {
        self.handle.is_some() && self.role.is_some() && self.host.is_some()
    }
}

/// Tracks which expected federates have joined and resigned
///
/// # Example
/// ```
/// use federation_manager_core_rs::models::membership::{
///     ExpectedFederate, FederateMembership, MembershipEvent, ATTR_HANDLE, ATTR_HOST, ATTR_TYPE,
/// };
/// use federation_manager_core_rs::ObjectId;
/// use std::collections::HashMap;
///
/// let mut membership = FederateMembership::new(
///     vec![ExpectedFederate::new("PingCounter", 1)],
///     "FederationManager",
///     Vec::<String>::new(),
/// );
/// membership.begin_join_phase();
///
/// membership.on_discovered(ObjectId(7), "fed-7");
/// let attrs: HashMap<String, String> = [
///     (ATTR_HANDLE, "7"), (ATTR_TYPE, "PingCounter"), (ATTR_HOST, "node-a"),
/// ]
/// .into_iter()
/// .map(|(k, v)| (k.to_string(), v.to_string()))
/// .collect();
///
/// let event = membership.on_attributes_updated(ObjectId(7), &attrs);
/// assert!(matches!(event, Some(MembershipEvent::Joined { .. })));
/// assert!(membership.is_join_complete());
/// ```
#[derive(Debug, Clone)]
pub struct FederateMembership {
    /// Role → required instance count
    expected: BTreeMap<String, usize>,
    /// The manager's own role
    self_role: String,
    /// Infrastructure roles that never count toward membership
    ignored_roles: HashSet<String>,
    /// Roles still awaited in the join phase
    pending_join: BTreeMap<String, usize>,
    /// Roles still awaited in the resign phase
    pending_resign: BTreeMap<String, usize>,
    /// Discovered objects still missing attributes
    incomplete: HashMap<ObjectId, DiscoveredFederate>,
    /// Joined objects and their role
    joined: HashMap<ObjectId, String>,
}

impl FederateMembership {
    pub fn new<I, S>(expected: Vec<ExpectedFederate>, self_role: impl Into<String>, ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut expected_map = BTreeMap::new();
        for federate in expected {
            if federate.count > 0 {
                *expected_map.entry(federate.role).or_insert(0) += federate.count;
            }
        }
        Self {
            pending_join: expected_map.clone(),
            pending_resign: BTreeMap::new(),
            expected: expected_map,
            self_role: self_role.into(),
            ignored_roles: ignored.into_iter().map(Into::into).collect(),
            incomplete: HashMap::new(),
            joined: HashMap::new(),
        }
    }

    /// Reset the join snapshot: every expected instance not already joined
    pub fn begin_join_phase(&mut self) {
        let mut pending = self.expected.clone();
        for role in self.joined.values() {
            decrement(&mut pending, role);
        }
        self.pending_join = pending;
    }

    /// Reset the resign snapshot: every expected instance currently joined
    pub fn begin_resign_phase(&mut self) {
        let mut pending = BTreeMap::new();
        for role in self.joined.values() {
            if self.expected.contains_key(role) {
                *pending.entry(role.clone()).or_insert(0) += 1;
            }
        }
        self.pending_resign = pending;
    }

    /// A federate object was discovered; attributes arrive separately
    pub fn on_discovered(&mut self, object: ObjectId, name: &str) {
        if self.joined.contains_key(&object) {
            return;
        }
        debug!(%object, name, "Federate object discovered");
        self.incomplete.entry(object).or_insert_with(|| DiscoveredFederate {
            name: name.to_string(),
            ..Default::default()
        });
    }

    /// Merge reflected attributes and promote the object once complete
    pub fn on_attributes_updated(
        &mut self,
        object: ObjectId,
        attributes: &HashMap<String, String>,
    ) -> Option<MembershipEvent> {
        if self.joined.contains_key(&object) {
            return None;
        }

        let entry = self.incomplete.entry(object).or_default();
        entry.merge(attributes);
        if !entry.is_complete() {
            return None;
        }

        let federate = self.incomplete.remove(&object)?;
        let role = federate.role?;

        if role == self.self_role || self.ignored_roles.contains(&role) {
            debug!(%object, role = %role, "Ignoring infrastructure federate");
            return None;
        }

        if self.expected.contains_key(&role) {
            decrement(&mut self.pending_join, &role);
            info!(%object, role = %role, name = %federate.name, "Federate joined");
        } else {
            warn!(%object, role = %role, "Unexpected federate joined");
        }
        self.joined.insert(object, role.clone());
        Some(MembershipEvent::Joined { role, object })
    }

    /// A federate object was removed from the federation
    pub fn on_removed(&mut self, object: ObjectId) -> Option<MembershipEvent> {
        self.incomplete.remove(&object);
        let Some(role) = self.joined.remove(&object) else {
            debug!(%object, "Removed object was never a joined federate");
            return None;
        };

        if !self.expected.contains_key(&role) {
            info!(%object, role = %role, "Unexpected federate resigned");
            return None;
        }

        decrement(&mut self.pending_resign, &role);
        info!(%object, role = %role, "Federate resigned");
        Some(MembershipEvent::Resigned { role, object })
    }

    pub fn is_join_complete(&self) -> bool {
        self.pending_join.is_empty()
    }

    pub fn is_resign_complete(&self) -> bool {
        self.pending_resign.is_empty()
    }

    /// Roles (with outstanding counts) still awaited for joining
    pub fn pending_join(&self) -> Vec<(String, usize)> {
        self.pending_join
            .iter()
            .map(|(role, count)| (role.clone(), *count))
            .collect()
    }

    /// Roles (with outstanding counts) still awaited for resigning
    pub fn pending_resign(&self) -> Vec<(String, usize)> {
        self.pending_resign
            .iter()
            .map(|(role, count)| (role.clone(), *count))
            .collect()
    }

    pub fn joined_count(&self) -> usize {
        self.joined.len()
    }

    pub fn role_of(&self, object: ObjectId) -> Option<&str> {
        self.joined.get(&object).map(String::as_str)
    }
}

fn decrement(counts: &mut BTreeMap<String, usize>, role: &str) {
    if let Some(count) = counts.get_mut(role) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(handle: &str, role: &str, host: &str) -> HashMap<String, String> {
        [(ATTR_HANDLE, handle), (ATTR_TYPE, role), (ATTR_HOST, host)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_partial_attributes_do_not_join() {
        let mut membership =
            FederateMembership::new(vec![ExpectedFederate::new("Pong", 1)], "Manager", Vec::<String>::new());
        membership.on_discovered(ObjectId(1), "pong");

        let mut partial = attrs("1", "Pong", "");
        assert_eq!(membership.on_attributes_updated(ObjectId(1), &partial), None);
        assert!(!membership.is_join_complete());

        partial.insert(ATTR_HOST.to_string(), "host-b".to_string());
        assert!(membership.on_attributes_updated(ObjectId(1), &partial).is_some());
        assert!(membership.is_join_complete());
    }

    #[test]
    fn test_self_and_ignored_roles_are_dropped() {
        let mut membership = FederateMembership::new(
            vec![ExpectedFederate::new("Pong", 1)],
            "Manager",
            vec!["Logger"],
        );
        assert_eq!(membership.on_attributes_updated(ObjectId(1), &attrs("1", "Manager", "h")), None);
        assert_eq!(membership.on_attributes_updated(ObjectId(2), &attrs("2", "Logger", "h")), None);
        assert_eq!(membership.joined_count(), 0);
        assert!(!membership.is_join_complete());
    }

    #[test]
    fn test_counts_require_every_instance() {
        let mut membership =
            FederateMembership::new(vec![ExpectedFederate::new("Sensor", 2)], "Manager", Vec::<String>::new());
        membership.on_attributes_updated(ObjectId(1), &attrs("1", "Sensor", "h"));
        assert_eq!(membership.pending_join(), vec![("Sensor".to_string(), 1)]);
        membership.on_attributes_updated(ObjectId(2), &attrs("2", "Sensor", "h"));
        assert!(membership.is_join_complete());
    }

    #[test]
    fn test_resign_snapshot_is_independent_of_join() {
        let mut membership =
            FederateMembership::new(vec![ExpectedFederate::new("Pong", 1)], "Manager", Vec::<String>::new());
        membership.begin_join_phase();
        membership.on_attributes_updated(ObjectId(1), &attrs("1", "Pong", "h"));
        assert!(membership.is_join_complete());

        membership.begin_resign_phase();
        assert_eq!(membership.pending_resign(), vec![("Pong".to_string(), 1)]);

        let event = membership.on_removed(ObjectId(1));
        assert_eq!(
            event,
            Some(MembershipEvent::Resigned {
                role: "Pong".to_string(),
                object: ObjectId(1)
            })
        );
        assert!(membership.is_resign_complete());
    }

    #[test]
    fn test_unknown_removal_is_not_an_error() {
        let mut membership =
            FederateMembership::new(vec![ExpectedFederate::new("Pong", 1)], "Manager", Vec::<String>::new());
        assert_eq!(membership.on_removed(ObjectId(99)), None);
    }
}

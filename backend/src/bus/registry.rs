//! Interaction class registry
//!
//! Caches name → handle resolution and remembers which classes were
//! published or subscribed, so each registration reaches the bus once no
//! matter how many components ask for it. One registry exists per
//! federation session and is owned by the federation core.

use crate::bus::error::BusError;
use crate::bus::retry::RetryPolicy;
use crate::bus::RtiBus;
use crate::models::interaction::ClassHandle;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct InteractionRegistry {
    handles: HashMap<String, ClassHandle>,
    names: HashMap<ClassHandle, String>,
    published: HashSet<ClassHandle>,
    subscribed: HashSet<ClassHandle>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name`, asking the bus only the first time
    pub fn resolve(
        &mut self,
        bus: &mut dyn RtiBus,
        retry: &RetryPolicy,
        name: &str,
    ) -> Result<ClassHandle, BusError> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(*handle);
        }
        let handle = retry.run("resolve interaction class", || bus.interaction_class(name))?;
        self.handles.insert(name.to_string(), handle);
        self.names.insert(handle, name.to_string());
        Ok(handle)
    }

    /// Publish `name` once; later calls are no-ops
    pub fn publish(
        &mut self,
        bus: &mut dyn RtiBus,
        retry: &RetryPolicy,
        name: &str,
    ) -> Result<ClassHandle, BusError> {
        let handle = self.resolve(bus, retry, name)?;
        if !self.published.contains(&handle) {
            retry.run("publish interaction class", || bus.publish_interaction_class(handle))?;
            self.published.insert(handle);
            debug!(class = name, "Published interaction class");
        }
        Ok(handle)
    }

    /// Subscribe to `name` once; later calls are no-ops
    pub fn subscribe(
        &mut self,
        bus: &mut dyn RtiBus,
        retry: &RetryPolicy,
        name: &str,
    ) -> Result<ClassHandle, BusError> {
        let handle = self.resolve(bus, retry, name)?;
        if !self.subscribed.contains(&handle) {
            retry.run("subscribe interaction class", || bus.subscribe_interaction_class(handle))?;
            self.subscribed.insert(handle);
            debug!(class = name, "Subscribed interaction class");
        }
        Ok(handle)
    }

    pub fn handle_of(&self, name: &str) -> Option<ClassHandle> {
        self.handles.get(name).copied()
    }

    pub fn name_of(&self, handle: ClassHandle) -> Option<&str> {
        self.names.get(&handle).map(String::as_str)
    }

    pub fn is_published(&self, name: &str) -> bool {
        self.handle_of(name)
            .is_some_and(|handle| self.published.contains(&handle))
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.handle_of(name)
            .is_some_and(|handle| self.subscribed.contains(&handle))
    }
}

//! Registered services and their per-service state

use crate::{
    Error, Result,
    factory::ServiceCoreFactory,
    representation::{ServiceConstructor, ServiceRepresentation},
    service::Service,
    state::ServiceState,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// Everything the reconciler tracks about one service
pub struct ServiceInstanceReference {
    representation: Arc<ServiceRepresentation>,
    pub(crate) state: ServiceState,
    pub(crate) core: Option<Arc<ServiceCoreFactory>>,
    pub(crate) instance: Option<Arc<dyn Service>>,
    last_state_change: DateTime<Utc>,
}

impl ServiceInstanceReference {
    fn new(representation: ServiceRepresentation) -> Self {
        Self {
            representation: Arc::new(representation),
            state: ServiceState::NoInstance,
            core: None,
            instance: None,
            last_state_change: Utc::now(),
        }
    }

    /// The registration data
    pub fn representation(&self) -> &Arc<ServiceRepresentation> {
        &self.representation
    }

    /// Current state
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Core factory, once instantiated
    pub fn core(&self) -> Option<&Arc<ServiceCoreFactory>> {
        self.core.as_ref()
    }

    /// Live service object, once produced
    pub fn instance(&self) -> Option<&Arc<dyn Service>> {
        self.instance.as_ref()
    }

    /// When the state last changed
    pub fn last_state_change(&self) -> DateTime<Utc> {
        self.last_state_change
    }

    pub(crate) fn transition(&mut self, to: ServiceState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::Precondition(format!(
                "Service {} cannot move from {} to {}",
                self.representation.service_name, self.state, to
            )));
        }

        debug!(
            "Service {} state: {} -> {}",
            self.representation.service_name, self.state, to
        );
        self.state = to;
        self.last_state_change = Utc::now();
        Ok(())
    }
}

/// Registered services, in registration order
#[derive(Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceInstanceReference>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `representation` unless its name is already taken
    ///
    /// Returns whether it was inserted. The first registration of a name wins.
    pub fn receive(&mut self, representation: ServiceRepresentation) -> bool {
        let name = representation.service_name.clone();
        if self.services.contains_key(&name) {
            debug!("Service {} already registered, keeping the first one", name);
            return false;
        }

        debug!(
            "Registering service {} (dependencies: {:?})",
            name, representation.dependencies
        );
        self.services
            .insert(name, ServiceInstanceReference::new(representation));
        true
    }

    /// Look up a service
    pub fn get(&self, name: &str) -> Result<&ServiceInstanceReference> {
        self.services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut ServiceInstanceReference> {
        self.services
            .get_mut(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate over the references, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceInstanceReference)> {
        self.services.iter().map(|(name, r)| (name.as_str(), r))
    }

    /// Constructor of `name`, resolving a lazy entry without instantiating anything
    pub fn get_service_class(&self, name: &str) -> Option<ServiceConstructor> {
        self.services
            .get(name)
            .map(|r| r.representation.service_entry.resolve())
    }
}

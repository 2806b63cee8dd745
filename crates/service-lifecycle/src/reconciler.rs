//! The lifecycle orchestrator
//!
//! [`ServiceReconciler`] owns the registry and walks it in weight order:
//! `instantiate` builds a core factory per service, `start` runs the start
//! hooks dependencies first, and `stop` runs the stop hooks dependents first.
//! Every walk is sequential; a hook is awaited before the next one runs.

use crate::{
    Error, Result,
    config::LifecycleConfig,
    context::ContextAccessor,
    factory::{CoreOptions, DepInstances, ServiceCoreFactory},
    registry::ServiceRegistry,
    representation::{ServiceConstructor, ServiceRepresentation},
    role::{Messenger, ServiceWorkMode},
    service::Service,
    state::{ReconcilerState, ServiceSnapshot, ServiceState},
    weight::{SortOrder, WeightResolver, WeightedServiceId},
};
use std::any::type_name;
use std::sync::Arc;
use tracing::{debug, info};

/// Dependency-ordered lifecycle orchestrator for the services of one process
pub struct ServiceReconciler {
    context: ContextAccessor,
    registry: ServiceRegistry,
    state: ReconcilerState,
    work_mode: ServiceWorkMode,
    messenger: Messenger,
}

impl ServiceReconciler {
    /// Create a reconciler and select its messenger
    ///
    /// The role comes from the process name unless `work_mode` forces one.
    /// Agent and standalone processes bind their channel here.
    pub fn new(
        context: ContextAccessor,
        work_mode: Option<ServiceWorkMode>,
        config: &LifecycleConfig,
    ) -> Result<Self> {
        let work_mode = ServiceWorkMode::resolve(context.process(), work_mode);
        let messenger = Messenger::select(work_mode, &config.messenger)?;

        info!(
            "Service reconciler for process {} running as {}",
            context.process().process_name,
            work_mode
        );

        Ok(Self {
            context,
            registry: ServiceRegistry::new(),
            state: ReconcilerState::NotBoot,
            work_mode,
            messenger,
        })
    }

    /// Role of the hosting process
    pub fn work_mode(&self) -> ServiceWorkMode {
        self.work_mode
    }

    /// Messenger shared by every service of this process
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Application context
    pub fn context(&self) -> &ContextAccessor {
        &self.context
    }

    /// Registered services
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Register a service; a name already registered keeps its first representation
    pub fn receive_service_representation(&mut self, representation: ServiceRepresentation) {
        self.registry.receive(representation);
    }

    /// Weight of `id` reached through the dependency path `chain`
    pub fn get_weight(&self, id: &str, chain: &[String]) -> Result<u32> {
        WeightResolver::new(&self.registry).weight(id, chain)
    }

    /// Every registered service with its weight, sorted in `order`
    pub fn get_ordered_service_id_set(&self, order: SortOrder) -> Result<Vec<WeightedServiceId>> {
        WeightResolver::new(&self.registry).ordered(order)
    }

    /// Build a core factory for every service that has none yet, dependencies first
    pub fn instantiate(&mut self) -> Result<()> {
        for WeightedServiceId { id, weight } in self.get_ordered_service_id_set(SortOrder::Asc)? {
            let reference = self.registry.get(&id)?;
            if reference.state() != ServiceState::NoInstance {
                continue;
            }

            debug!("Instantiating service {} (weight {})", id, weight);
            let representation = reference.representation().clone();

            let mut dependencies = DepInstances::new();
            for dependency in &representation.dependencies {
                let core = self
                    .registry
                    .get(dependency)?
                    .core()
                    .cloned()
                    .ok_or_else(|| Error::DependencyNotInstantiated {
                        service: id.clone(),
                        dependency: dependency.clone(),
                    })?;
                dependencies.insert(dependency.clone(), core);
            }

            let constructor = representation.service_entry.resolve();
            let config = representation
                .resolve_config(&self.context)
                .map_err(|source| Error::ConfigResolver {
                    service: id.clone(),
                    source,
                })?;

            let options = CoreOptions {
                messenger: self.messenger.clone(),
                work_mode: self.work_mode,
                context: self.context.clone(),
                representation,
                config,
                dependencies,
            };
            let core = Arc::new(ServiceCoreFactory::new(options, constructor));

            let reference = self.registry.get_mut(&id)?;
            reference.core = Some(core);
            reference.transition(ServiceState::Instanced)?;
        }

        Ok(())
    }

    /// Instantiate what is missing, then start every service that is not running
    ///
    /// Services already booted are skipped, so calling this twice is harmless.
    /// A failing hook stops the walk; the failing service stays `booting`.
    pub async fn start(&mut self) -> Result<()> {
        self.instantiate()?;
        if self.state != ReconcilerState::Booted {
            self.state = ReconcilerState::Booting;
        }
        info!("Starting {} services", self.registry.len());

        for WeightedServiceId { id, .. } in self.get_ordered_service_id_set(SortOrder::Asc)? {
            let reference = self.registry.get_mut(&id)?;
            match reference.state() {
                ServiceState::Instanced => {}
                ServiceState::NoInstance => {
                    return Err(Error::Precondition(format!(
                        "Service {} was not instantiated before start",
                        id
                    )));
                }
                _ => continue,
            }

            reference.transition(ServiceState::Booting)?;
            let core = reference
                .core
                .clone()
                .ok_or_else(|| Error::NotYetInstanced(id.clone()))?;
            reference.instance = Some(core.instantiate()?);

            core.start().await?;
            self.registry.get_mut(&id)?.transition(ServiceState::Booted)?;
            debug!("Service {} booted", id);
        }

        self.state = ReconcilerState::Booted;
        info!("All services booted");
        Ok(())
    }

    /// Stop every running service, dependents first
    ///
    /// Does nothing unless something was started.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == ReconcilerState::NotBoot {
            debug!("Stop requested with nothing booted");
            return Ok(());
        }

        self.state = ReconcilerState::Stopping;
        info!("Stopping {} services", self.registry.len());

        for WeightedServiceId { id, .. } in self.get_ordered_service_id_set(SortOrder::Desc)? {
            let reference = self.registry.get_mut(&id)?;
            match reference.state() {
                ServiceState::Booted => {}
                ServiceState::NoInstance => {
                    return Err(Error::Precondition(format!(
                        "Service {} was never instantiated",
                        id
                    )));
                }
                _ => continue,
            }

            reference.transition(ServiceState::Stopping)?;
            let core = reference
                .core
                .clone()
                .ok_or_else(|| Error::NotYetInstanced(id.clone()))?;

            core.stop().await?;
            let reference = self.registry.get_mut(&id)?;
            reference.instance = core.service();
            reference.transition(ServiceState::Instanced)?;
            debug!("Service {} stopped", id);
        }

        self.state = ReconcilerState::NotBoot;
        info!("All services stopped");
        Ok(())
    }

    /// Live object of `id`
    pub fn get(&self, id: &str) -> Result<Arc<dyn Service>> {
        self.registry
            .get(id)?
            .instance()
            .cloned()
            .ok_or_else(|| Error::NotYetInstanced(id.to_string()))
    }

    /// Live object of `id`, as its concrete type
    pub fn get_as<T: Service>(&self, id: &str) -> Result<Arc<T>> {
        self.get(id)?.as_any_arc().downcast::<T>().map_err(|_| {
            Error::Precondition(format!("Service {} is not a {}", id, type_name::<T>()))
        })
    }

    /// Constructor of `id`, without instantiating anything
    pub fn get_service_class(&self, id: &str) -> Option<ServiceConstructor> {
        self.registry.get_service_class(id)
    }

    /// Orchestrator-level state
    pub fn get_state(&self) -> ReconcilerState {
        self.state
    }

    /// State of one service
    pub fn service_state(&self, id: &str) -> Result<ServiceState> {
        Ok(self.registry.get(id)?.state())
    }

    /// Registered names, in registration order
    pub fn service_names(&self) -> Vec<String> {
        self.registry.ids().map(str::to_string).collect()
    }

    /// Point-in-time view of every service, in startup order
    pub fn snapshot(&self) -> Result<Vec<ServiceSnapshot>> {
        let order = self.get_ordered_service_id_set(SortOrder::Asc)?;
        order
            .into_iter()
            .map(|WeightedServiceId { id, weight }| -> Result<ServiceSnapshot> {
                let reference = self.registry.get(&id)?;
                Ok(ServiceSnapshot {
                    state: reference.state(),
                    weight,
                    dependencies: reference.representation().dependencies.clone(),
                    last_state_change: reference.last_state_change(),
                    name: id,
                })
            })
            .collect()
    }
}

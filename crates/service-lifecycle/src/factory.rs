//! Service core factory: one resolved service bound to its context

use crate::{
    Error, Result,
    context::ContextAccessor,
    representation::{ServiceConstructor, ServiceRepresentation},
    role::{Messenger, ServiceWorkMode},
    service::Service,
    state::LifecyclePhase,
};
use async_channel::Receiver;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Core factories of a service's dependencies, in declaration order
pub type DepInstances = IndexMap<String, Arc<ServiceCoreFactory>>;

/// What a service constructor receives
#[derive(Clone)]
pub struct ServiceContext {
    name: String,
    config: Value,
    accessor: ContextAccessor,
    work_mode: ServiceWorkMode,
    messenger: Messenger,
    dependencies: Arc<DepInstances>,
}

impl ServiceContext {
    /// Name of the service being built
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved config
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Resolved config, deserialized
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.config.clone())?)
    }

    /// Application context
    pub fn accessor(&self) -> &ContextAccessor {
        &self.accessor
    }

    /// Role of the hosting process
    pub fn work_mode(&self) -> ServiceWorkMode {
        self.work_mode
    }

    /// Messenger of the hosting process
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// All dependency core factories
    pub fn dependencies(&self) -> &DepInstances {
        &self.dependencies
    }

    /// Core factory of one dependency
    pub fn dependency(&self, name: &str) -> Option<&Arc<ServiceCoreFactory>> {
        self.dependencies.get(name)
    }

    /// Live object of one dependency, if it has produced one
    pub fn dependency_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.dependency(name).and_then(|core| core.service())
    }

    /// Live object of one dependency, as its concrete type
    pub fn dependency_as<T: Service>(&self, name: &str) -> Option<Arc<T>> {
        self.dependency_service(name)?
            .as_any_arc()
            .downcast::<T>()
            .ok()
    }

    /// Answer `<service>.<method>` requests from other processes
    ///
    /// Only the process owning the channel can expose methods.
    pub async fn expose<F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = service_messenger::Result<Value>> + Send + 'static,
    {
        let server = self.messenger.server().ok_or_else(|| {
            Error::Precondition(format!(
                "Service {} cannot expose {} from a {} process",
                self.name, method, self.work_mode
            ))
        })?;

        let action = format!("{}.{}", self.name, method);
        debug!("Service {} exposing {}", self.name, action);
        server.handle(action, handler).await;
        Ok(())
    }

    /// Call a method another service exposed, in this process or in the agent
    pub async fn invoke(&self, service: &str, method: &str, data: Value) -> Result<Value> {
        let action = format!("{}.{}", service, method);
        self.messenger.invoke(&action, data).await
    }

    /// Publish on `topic`
    pub async fn publish(&self, topic: &str, data: Value) -> Result<()> {
        self.messenger.publish(topic, data).await
    }

    /// Receive what is published on `topic`
    pub async fn subscribe(&self, topic: &str) -> Result<Receiver<Value>> {
        self.messenger.subscribe(topic).await
    }
}

/// Everything a core factory is built from
pub struct CoreOptions {
    /// Messenger of the hosting process
    pub messenger: Messenger,
    /// Role of the hosting process
    pub work_mode: ServiceWorkMode,
    /// Application context
    pub context: ContextAccessor,
    /// The service's registration data
    pub representation: Arc<ServiceRepresentation>,
    /// Config after the resolver ran
    pub config: Value,
    /// Dependency core factories
    pub dependencies: DepInstances,
}

/// One service's constructor bound to its resolved context
///
/// The concrete object is produced once and reused across every start/stop
/// cycle of the reconciler.
pub struct ServiceCoreFactory {
    representation: Arc<ServiceRepresentation>,
    context: ServiceContext,
    constructor: ServiceConstructor,
    service: RwLock<Option<Arc<dyn Service>>>,
}

impl ServiceCoreFactory {
    /// Bind `constructor` to `options`
    pub fn new(options: CoreOptions, constructor: ServiceConstructor) -> Self {
        let context = ServiceContext {
            name: options.representation.service_name.clone(),
            config: options.config,
            accessor: options.context,
            work_mode: options.work_mode,
            messenger: options.messenger,
            dependencies: Arc::new(options.dependencies),
        };

        Self {
            representation: options.representation,
            context,
            constructor,
            service: RwLock::new(None),
        }
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    /// Context handed to the constructor
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Registration data
    pub fn representation(&self) -> &Arc<ServiceRepresentation> {
        &self.representation
    }

    /// Produce the concrete object, or return the one already produced
    pub fn instantiate(&self) -> Result<Arc<dyn Service>> {
        if let Some(service) = self.service() {
            return Ok(service);
        }

        debug!("Constructing service {}", self.name());
        let service = (self.constructor)(self.context.clone()).map_err(|source| {
            Error::ServiceHook {
                service: self.name().to_string(),
                phase: LifecyclePhase::Instantiate,
                source,
            }
        })?;

        let mut slot = self.service.write().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.get_or_insert(service).clone())
    }

    /// Run the start hook
    pub async fn start(&self) -> Result<()> {
        let service = self.live(LifecyclePhase::Start)?;
        service.start().await.map_err(|source| Error::ServiceHook {
            service: self.name().to_string(),
            phase: LifecyclePhase::Start,
            source,
        })
    }

    /// Run the stop hook
    pub async fn stop(&self) -> Result<()> {
        let service = self.live(LifecyclePhase::Stop)?;
        service.stop().await.map_err(|source| Error::ServiceHook {
            service: self.name().to_string(),
            phase: LifecyclePhase::Stop,
            source,
        })
    }

    /// Last object produced by [`instantiate`](Self::instantiate)
    pub fn service(&self) -> Option<Arc<dyn Service>> {
        self.service
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn live(&self, phase: LifecyclePhase) -> Result<Arc<dyn Service>> {
        debug!("Service {} {} requested", self.name(), phase);
        self.service()
            .ok_or_else(|| Error::NotYetInstanced(self.name().to_string()))
    }
}

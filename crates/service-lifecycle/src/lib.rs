//! # Service Lifecycle
//!
//! Dependency-ordered lifecycle orchestration for the services of a
//! multi-process application container.
//!
//! Services are declared as [`ServiceRepresentation`]s naming the services
//! they depend on. The [`ServiceReconciler`] turns the dependency graph into
//! a deterministic order by weight (leaves weigh 1, every other service one
//! more than its heaviest dependency), instantiates every service in that
//! order, starts them one at a time, and stops them in exactly the reverse
//! order.
//!
//! At construction the reconciler also picks a messenger from the process
//! role: the agent binds the container's well-known channel, workers connect
//! to it, and a standalone process binds a private channel of its own. Every
//! service receives that messenger through its [`ServiceContext`] to expose
//! or consume state across process boundaries.
//!
//! ## Example
//!
//! ```no_run
//! use service_lifecycle::{
//!     ContextAccessor, LifecycleConfig, ProcessRepresentation, Service, ServiceEntry,
//!     ServiceReconciler, ServiceRepresentation,
//! };
//!
//! struct Cache;
//!
//! #[async_trait::async_trait]
//! impl Service for Cache {}
//!
//! # async fn example() -> anyhow::Result<()> {
//! let context = ContextAccessor::new(ProcessRepresentation::new("worker"));
//! let mut reconciler = ServiceReconciler::new(context, None, &LifecycleConfig::default())?;
//!
//! reconciler.receive_service_representation(ServiceRepresentation::new(
//!     "cache",
//!     ServiceEntry::of(|_ctx| Ok(Cache)),
//! ));
//!
//! reconciler.start().await?;
//! let cache = reconciler.get_as::<Cache>("cache")?;
//! reconciler.stop().await?;
//! # drop(cache);
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod factory;
mod reconciler;
mod registry;
mod representation;
mod role;
mod service;
mod state;
mod weight;

pub use config::{CHANNEL_ENV, LifecycleConfig, SOCKET_DIR_ENV};
pub use context::{ContextAccessor, ProcessRepresentation};
pub use factory::{CoreOptions, DepInstances, ServiceContext, ServiceCoreFactory};
pub use reconciler::ServiceReconciler;
pub use registry::{ServiceInstanceReference, ServiceRegistry};
pub use representation::{ConfigResolver, ServiceConstructor, ServiceEntry, ServiceRepresentation};
pub use role::{AGENT_PROCESS_NAME, Messenger, STANDALONE_CHANNEL_PREFIX, ServiceWorkMode};
pub use service::{AsAnyArc, Service};
pub use state::{LifecyclePhase, ReconcilerState, ServiceSnapshot, ServiceState};
pub use weight::{SortOrder, WeightResolver, WeightedServiceId};

/// Error types for lifecycle operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An operation referenced a service that was never registered
    #[error("Could not find service id: {0}")]
    UnknownService(String),

    /// Weight computation met the same service twice on one dependency path
    #[error("Service name: {id} in a cyclic dependency chain: {} -> {id}", .chain.join(" -> "))]
    CyclicDependency {
        /// Service found again on the path
        id: String,
        /// Dependency path walked before reaching `id` again
        chain: Vec<String>,
    },

    /// A service has not produced an instance yet
    #[error("Service id: {0} has no instance yet")]
    NotYetInstanced(String),

    /// A dependency had no core factory when its dependent was instantiated
    #[error("Dependency {dependency} of service {service} has not been instantiated")]
    DependencyNotInstantiated {
        /// Service being instantiated
        service: String,
        /// Missing dependency
        dependency: String,
    },

    /// An operation was called out of sequence
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A service's own constructor or hook failed
    #[error("Service {service} failed during {phase}: {source}")]
    ServiceHook {
        /// Failing service
        service: String,
        /// Phase the failure happened in
        phase: LifecyclePhase,
        /// Error returned by the service
        source: anyhow::Error,
    },

    /// A service's config resolver failed
    #[error("Config resolver for service {service} failed: {source}")]
    ConfigResolver {
        /// Service whose config was being resolved
        service: String,
        /// Error returned by the resolver
        source: anyhow::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Messenger errors
    #[error("Messenger error: {0}")]
    Messenger(#[from] service_messenger::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

//! Declarative service descriptions

use crate::{context::ContextAccessor, factory::ServiceContext, service::Service};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds the concrete service object from its context
pub type ServiceConstructor =
    Arc<dyn Fn(ServiceContext) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

/// Turns the raw config of a service into the config it runs with
pub type ConfigResolver =
    Arc<dyn Fn(&ContextAccessor, Value) -> anyhow::Result<Value> + Send + Sync>;

/// Entry point of a service
#[derive(Clone)]
pub enum ServiceEntry {
    /// Constructor available at registration time
    Immediate(ServiceConstructor),
    /// Constructor produced on demand, when the service is instantiated
    Lazy(Arc<dyn Fn() -> ServiceConstructor + Send + Sync>),
}

impl ServiceEntry {
    /// Entry from a constructor returning a concrete service type
    pub fn of<S, F>(build: F) -> Self
    where
        S: Service,
        F: Fn(ServiceContext) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let constructor: ServiceConstructor =
            Arc::new(move |ctx: ServiceContext| -> anyhow::Result<Arc<dyn Service>> {
                Ok(Arc::new(build(ctx)?))
            });
        ServiceEntry::Immediate(constructor)
    }

    /// Entry whose constructor is only built when first needed
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> ServiceConstructor + Send + Sync + 'static,
    {
        ServiceEntry::Lazy(Arc::new(loader))
    }

    /// Resolve to the constructor
    pub fn resolve(&self) -> ServiceConstructor {
        match self {
            ServiceEntry::Immediate(constructor) => constructor.clone(),
            ServiceEntry::Lazy(loader) => loader(),
        }
    }

    /// Whether resolution is deferred
    pub fn is_lazy(&self) -> bool {
        matches!(self, ServiceEntry::Lazy(_))
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEntry::Immediate(_) => f.write_str("ServiceEntry::Immediate"),
            ServiceEntry::Lazy(_) => f.write_str("ServiceEntry::Lazy"),
        }
    }
}

/// Declaration of one service
#[derive(Clone)]
pub struct ServiceRepresentation {
    /// Unique service name
    pub service_name: String,
    /// Services this one depends on, in declaration order
    pub dependencies: Vec<String>,
    /// Entry point
    pub service_entry: ServiceEntry,
    /// Raw config, opaque to the reconciler
    pub config: Value,
    /// Optional transformation applied to `config` at instantiation
    pub config_resolver: Option<ConfigResolver>,
}

impl ServiceRepresentation {
    /// Declare a service without dependencies or config
    pub fn new(service_name: impl Into<String>, service_entry: ServiceEntry) -> Self {
        Self {
            service_name: service_name.into(),
            dependencies: Vec::new(),
            service_entry,
            config: Value::Null,
            config_resolver: None,
        }
    }

    /// Add a dependency
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add several dependencies
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    /// Set the raw config
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Set the config resolver
    pub fn with_config_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ContextAccessor, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.config_resolver = Some(Arc::new(resolver));
        self
    }

    /// Config the service runs with: the raw config passed through the resolver, if any
    pub fn resolve_config(&self, context: &ContextAccessor) -> anyhow::Result<Value> {
        match &self.config_resolver {
            Some(resolver) => resolver(context, self.config.clone()),
            None => Ok(self.config.clone()),
        }
    }
}

impl fmt::Debug for ServiceRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRepresentation")
            .field("service_name", &self.service_name)
            .field("dependencies", &self.dependencies)
            .field("service_entry", &self.service_entry)
            .field("config", &self.config)
            .field("config_resolver", &self.config_resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessRepresentation;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait::async_trait]
    impl Service for Noop {}

    #[test]
    fn test_lazy_entry_defers_loading() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let entry = ServiceEntry::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let constructor: ServiceConstructor =
                Arc::new(|_ctx: ServiceContext| -> anyhow::Result<Arc<dyn Service>> {
                    Ok(Arc::new(Noop))
                });
            constructor
        });

        assert!(entry.is_lazy());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        entry.resolve();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_resolver_sees_context() {
        let context = ContextAccessor::new(ProcessRepresentation::new("worker"))
            .with_property("port", "8080");
        let representation = ServiceRepresentation::new("http", ServiceEntry::of(|_| Ok(Noop)))
            .with_config(json!({ "host": "localhost" }))
            .with_config_resolver(|ctx, mut config| {
                config["port"] = json!(ctx.property("port"));
                Ok(config)
            });

        let resolved = representation.resolve_config(&context).unwrap();
        assert_eq!(resolved, json!({ "host": "localhost", "port": "8080" }));
        assert_eq!(representation.config, json!({ "host": "localhost" }));
    }

    #[test]
    fn test_builder_keeps_dependency_order() {
        let representation = ServiceRepresentation::new("api", ServiceEntry::of(|_| Ok(Noop)))
            .with_dependency("db")
            .with_dependencies(["cache", "queue"]);

        assert_eq!(representation.dependencies, vec!["db", "cache", "queue"]);
        assert_eq!(representation.config, Value::Null);
    }
}

//! The trait concrete services implement

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// A service managed by the reconciler
///
/// Both hooks default to doing nothing. Hooks run strictly one service at a
/// time, dependencies first on start and dependents first on stop, so a
/// service may rely on every dependency being fully started while its own
/// `start` runs. Errors are returned as-is to the caller of
/// `ServiceReconciler::start`/`stop`; nothing retries them.
#[async_trait]
pub trait Service: AsAnyArc + Send + Sync + 'static {
    /// Start hook
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop hook
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Upcast to `Any` so a type-erased service can be downcast to its concrete type
pub trait AsAnyArc {
    /// Convert into `Arc<dyn Any>`
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe(u8);

    #[async_trait]
    impl Service for Probe {}

    struct Other;

    #[async_trait]
    impl Service for Other {}

    #[test]
    fn test_downcast_through_trait_object() {
        let service: Arc<dyn Service> = Arc::new(Probe(7));
        let probe = service.clone().as_any_arc().downcast::<Probe>().unwrap();
        assert_eq!(probe.0, 7);
        assert!(service.as_any_arc().downcast::<Other>().is_err());
    }
}

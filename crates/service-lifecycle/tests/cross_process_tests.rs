//! Integration tests for agent/worker coordination over a real channel

use serde_json::{Value, json};
use service_lifecycle::{
    ContextAccessor, Error, LifecycleConfig, ProcessRepresentation, Service, ServiceContext,
    ServiceEntry, ServiceReconciler, ServiceRepresentation, ServiceWorkMode,
};
use service_messenger::MessengerConfig;
use smol::Timer;
use std::sync::Mutex;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config(dir: &tempfile::TempDir) -> LifecycleConfig {
    LifecycleConfig {
        messenger: MessengerConfig::new(dir.path(), "container"),
    }
}

fn reconciler(
    process: &str,
    forced: Option<ServiceWorkMode>,
    config: &LifecycleConfig,
) -> ServiceReconciler {
    let context = ContextAccessor::new(ProcessRepresentation::new(process));
    ServiceReconciler::new(context, forced, config).unwrap()
}

async fn recv_within(rx: &async_channel::Receiver<Value>) -> Option<Value> {
    smol::future::or(async { rx.recv().await.ok() }, async {
        Timer::after(Duration::from_secs(5)).await;
        None
    })
    .await
}

/// Agent-side service answering stock queries for every process
struct Inventory {
    ctx: ServiceContext,
}

#[async_trait::async_trait]
impl Service for Inventory {
    async fn start(&self) -> anyhow::Result<()> {
        self.ctx
            .expose("count", |data: Value| async move {
                let sku = data["sku"].as_str().unwrap_or_default().to_string();
                Ok(json!({ "sku": sku, "count": 3 }))
            })
            .await?;
        Ok(())
    }
}

/// Worker-side service asking the agent during its own start hook
struct Storefront {
    ctx: ServiceContext,
    stock: Mutex<Option<Value>>,
}

#[async_trait::async_trait]
impl Service for Storefront {
    async fn start(&self) -> anyhow::Result<()> {
        let reply = self
            .ctx
            .invoke("inventory", "count", json!({ "sku": "tea" }))
            .await?;
        *self.stock.lock().unwrap() = Some(reply);
        Ok(())
    }
}

fn inventory() -> ServiceRepresentation {
    ServiceRepresentation::new("inventory", ServiceEntry::of(|ctx| Ok(Inventory { ctx })))
}

fn storefront() -> ServiceRepresentation {
    ServiceRepresentation::new(
        "storefront",
        ServiceEntry::of(|ctx| {
            Ok(Storefront {
                ctx,
                stock: Mutex::new(None),
            })
        }),
    )
}

#[smol_potat::test]
async fn test_worker_invokes_method_exposed_by_agent() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut agent = reconciler("agent", None, &config);
    assert_eq!(agent.work_mode(), ServiceWorkMode::Agent);
    assert_eq!(agent.messenger().path(), config.messenger.socket_path());
    agent.receive_service_representation(inventory());
    agent.start().await.unwrap();

    let mut worker = reconciler("worker-1", None, &config);
    assert_eq!(worker.work_mode(), ServiceWorkMode::Worker);
    worker.receive_service_representation(storefront());
    worker.start().await.unwrap();

    let storefront = worker.get_as::<Storefront>("storefront").unwrap();
    assert_eq!(
        *storefront.stock.lock().unwrap(),
        Some(json!({ "sku": "tea", "count": 3 }))
    );

    worker.stop().await.unwrap();
    agent.stop().await.unwrap();
    worker.messenger().close().await;
    agent.messenger().close().await;
    assert!(!config.messenger.socket_path().exists());
}

#[smol_potat::test]
async fn test_agent_invokes_its_own_exposed_method_locally() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut agent = reconciler("agent", None, &config);
    agent.receive_service_representation(inventory());
    agent.receive_service_representation(storefront().with_dependency("inventory"));
    agent.start().await.unwrap();

    let storefront = agent.get_as::<Storefront>("storefront").unwrap();
    assert_eq!(
        *storefront.stock.lock().unwrap(),
        Some(json!({ "sku": "tea", "count": 3 }))
    );
    agent.messenger().close().await;
}

#[smol_potat::test]
async fn test_worker_publish_reaches_agent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let agent = reconciler("agent", None, &config);
    let events = agent.messenger().subscribe("orders").await.unwrap();

    let worker = reconciler("worker-1", None, &config);
    worker
        .messenger()
        .publish("orders", json!({ "id": 7 }))
        .await
        .unwrap();

    assert_eq!(recv_within(&events).await, Some(json!({ "id": 7 })));
    worker.messenger().close().await;
    agent.messenger().close().await;
}

#[smol_potat::test]
async fn test_worker_failure_surfaces_on_first_use() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut worker = reconciler("worker-1", None, &config);
    worker.receive_service_representation(storefront());

    let err = worker.start().await.unwrap_err();
    assert!(matches!(err, Error::ServiceHook { ref service, .. } if service == "storefront"));
}

#[smol_potat::test]
async fn test_standalone_channels_are_private() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let first = reconciler("worker-1", Some(ServiceWorkMode::Standalone), &config);
    let second = reconciler("worker-2", Some(ServiceWorkMode::Standalone), &config);

    assert!(first.messenger().is_server());
    assert!(second.messenger().is_server());
    assert_ne!(first.messenger().path(), second.messenger().path());
    assert_ne!(first.messenger().path(), config.messenger.socket_path());

    // A second agent on the shared channel is refused while the first is alive
    let _agent = reconciler("agent", None, &config);
    let context = ContextAccessor::new(ProcessRepresentation::new("agent"));
    let err = ServiceReconciler::new(context, None, &config).err().unwrap();
    assert!(matches!(
        err,
        Error::Messenger(service_messenger::Error::ChannelInUse(_))
    ));

    first.messenger().close().await;
    second.messenger().close().await;
}

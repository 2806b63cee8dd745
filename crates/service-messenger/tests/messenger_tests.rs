//! Integration tests for the messenger channel

use serde_json::json;
use service_messenger::{Error, MessengerClient, MessengerConfig, MessengerServer};
use smol::Timer;
use std::time::Duration;

fn test_config(dir: &tempfile::TempDir) -> MessengerConfig {
    MessengerConfig::new(dir.path(), "bus")
}

/// Await `rx` for at most a few seconds so a broken channel fails the test instead of hanging it
async fn recv_within(rx: &async_channel::Receiver<serde_json::Value>) -> Option<serde_json::Value> {
    smol::future::or(async { rx.recv().await.ok() }, async {
        Timer::after(Duration::from_secs(5)).await;
        None
    })
    .await
}

#[smol_potat::test]
async fn test_request_response_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let server = MessengerServer::bind(&config).unwrap();
    server
        .handle("math.double", |data| async move {
            let n = data["n"].as_i64().unwrap_or_default();
            Ok(json!({ "n": n * 2 }))
        })
        .await;

    let client = MessengerClient::new(&config);
    assert!(!client.is_connected().await);

    let reply = client.request("math.double", json!({ "n": 21 })).await.unwrap();
    assert_eq!(reply, json!({ "n": 42 }));
    assert!(client.is_connected().await);
    assert_eq!(server.connection_count().await, 1);
}

#[smol_potat::test]
async fn test_unknown_action_is_reported_remotely() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let _server = MessengerServer::bind(&config).unwrap();

    let client = MessengerClient::new(&config);
    let err = client.request("missing", json!(null)).await.unwrap_err();

    match err {
        Error::Remote { code, message } => {
            assert_eq!(code, "no_handler");
            assert!(message.contains("missing"));
        }
        other => panic!("Expected remote error, got {other:?}"),
    }
}

#[smol_potat::test]
async fn test_handler_failure_reaches_client() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let server = MessengerServer::bind(&config).unwrap();
    server
        .handle("fail", |_| async move { Err(Error::handler("boom")) })
        .await;

    let client = MessengerClient::new(&config);
    let err = client.request("fail", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Remote { ref code, .. } if code == "handler_error"));
}

#[smol_potat::test]
async fn test_broadcast_reaches_subscribed_clients() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let server = MessengerServer::bind(&config).unwrap();
    server.handle("ping", |_| async move { Ok(json!("pong")) }).await;

    let client = MessengerClient::new(&config);
    let rx = client.subscribe("service.booted").await.unwrap();
    // A completed request proves the server has registered the connection
    client.request("ping", json!(null)).await.unwrap();

    let local = server.subscribe("service.booted").await;
    let reached = server.broadcast("service.booted", json!({ "name": "cache" })).await;
    assert_eq!(reached, 1);

    assert_eq!(recv_within(&rx).await, Some(json!({ "name": "cache" })));
    assert_eq!(recv_within(&local).await, Some(json!({ "name": "cache" })));
}

#[smol_potat::test]
async fn test_client_publish_reaches_server_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let server = MessengerServer::bind(&config).unwrap();
    let rx = server.subscribe("worker.report").await;

    let client = MessengerClient::new(&config);
    client.publish("worker.report", json!({ "load": 3 })).await.unwrap();

    assert_eq!(recv_within(&rx).await, Some(json!({ "load": 3 })));
}

#[smol_potat::test]
async fn test_connect_failure_surfaces_on_first_use() {
    let dir = tempfile::tempdir().unwrap();
    let client = MessengerClient::new(&test_config(&dir));

    let err = client.request("anything", json!(null)).await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[smol_potat::test]
async fn test_second_server_on_live_channel_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let _server = MessengerServer::bind(&config).unwrap();

    match MessengerServer::bind(&config) {
        Err(Error::ChannelInUse(path)) => assert_eq!(path, config.socket_path()),
        Err(other) => panic!("Expected ChannelInUse, got {other:?}"),
        Ok(_) => panic!("Second bind on a live channel should fail"),
    }
}

#[smol_potat::test]
async fn test_stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    std::fs::write(config.socket_path(), b"").unwrap();

    let server = MessengerServer::bind(&config).unwrap();
    server.handle("ping", |_| async move { Ok(json!("pong")) }).await;

    let client = MessengerClient::new(&config);
    assert_eq!(client.request("ping", json!(null)).await.unwrap(), json!("pong"));
}

#[smol_potat::test]
async fn test_close_disconnects_clients_and_removes_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let server = MessengerServer::bind(&config).unwrap();
    server.handle("ping", |_| async move { Ok(json!("pong")) }).await;

    let client = MessengerClient::new(&config);
    client.request("ping", json!(null)).await.unwrap();

    server.close().await;
    assert!(!config.socket_path().exists());

    // Give the client loop time to observe the close frame
    Timer::after(Duration::from_millis(100)).await;
    assert!(!client.is_connected().await);
    assert!(client.request("ping", json!(null)).await.is_err());
}

#[smol_potat::test]
async fn test_local_dispatch_uses_registered_handler() {
    let dir = tempfile::tempdir().unwrap();
    let server = MessengerServer::bind(&test_config(&dir)).unwrap();
    server.handle("echo", |data| async move { Ok(data) }).await;

    assert!(server.has_handler("echo").await);
    assert_eq!(server.dispatch("echo", json!([1, 2])).await.unwrap(), json!([1, 2]));
    assert!(matches!(
        server.dispatch("nope", json!(null)).await,
        Err(Error::NoHandler(_))
    ));
}

/// Registers `slow`, which reports when it starts and then waits for the gate to open
async fn register_slow(
    server: &MessengerServer,
) -> (async_channel::Receiver<()>, async_channel::Sender<()>) {
    let (started_tx, started_rx) = async_channel::unbounded::<()>();
    let (gate_tx, gate_rx) = async_channel::unbounded::<()>();
    server
        .handle("slow", move |_| {
            let started = started_tx.clone();
            let gate = gate_rx.clone();
            async move {
                let _ = started.send(()).await;
                let _ = gate.recv().await;
                Ok(json!("late"))
            }
        })
        .await;
    (started_rx, gate_tx)
}

#[smol_potat::test]
async fn test_dropping_closed_server_keeps_successor_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let old = MessengerServer::bind(&config).unwrap();
    old.close().await;

    let new = MessengerServer::bind(&config).unwrap();
    new.handle("echo", |data| async move { Ok(data) }).await;
    drop(old);

    assert!(config.socket_path().exists());
    let client = MessengerClient::new(&config);
    assert_eq!(client.request("echo", json!(5)).await.unwrap(), json!(5));
}

#[smol_potat::test]
async fn test_slow_handler_does_not_block_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let server = MessengerServer::bind(&config).unwrap();
    server.handle("ping", |_| async move { Ok(json!("pong")) }).await;
    let (started, gate) = register_slow(&server).await;

    let client = MessengerClient::new(&config);
    let slow = smol::spawn({
        let client = client.clone();
        async move { client.request("slow", json!(null)).await }
    });
    started.recv().await.unwrap();

    // Same connection, answered while `slow` is still waiting
    assert_eq!(client.request("ping", json!(null)).await.unwrap(), json!("pong"));

    gate.send(()).await.unwrap();
    assert_eq!(slow.await.unwrap(), json!("late"));
}

#[smol_potat::test]
async fn test_reconnect_after_server_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let first = MessengerServer::bind(&config).unwrap();
    let (started, _gate) = register_slow(&first).await;

    let client = MessengerClient::new(&config);
    let in_flight = smol::spawn({
        let client = client.clone();
        async move { client.request("slow", json!(null)).await }
    });
    started.recv().await.unwrap();

    first.close().await;
    assert!(matches!(in_flight.await, Err(Error::Closed)));

    let second = MessengerServer::bind(&config).unwrap();
    second.handle("ping", |_| async move { Ok(json!("pong")) }).await;

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            smol::spawn(async move { client.request("ping", json!(null)).await })
        })
        .collect();
    for request in requests {
        assert_eq!(request.await.unwrap(), json!("pong"));
    }
    assert!(client.is_connected().await);
}

//! Composite lifecycle tests: start both protocols, trigger shutdown, check
//! that every listener is released and cleanup ran once.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use user_apiserver::lifecycle::{ManualManager, ServerState, ShutdownError};
use user_apiserver::rpc::proto::user_service_client::UserServiceClient;
use user_apiserver::rpc::proto::GetUserRequest;
use user_apiserver::store::{MemoryUserStore, StoreError, UserStore};
use user_apiserver::{ApiServer, ServerError};

#[tokio::test]
async fn test_manual_trigger_stops_both_listeners() {
    let config = test_config(28311, 28312);
    let http_addr = addr(&config.http.bind_address);
    let rpc_addr = addr(&config.rpc.bind_address);
    let store = seeded_store(&config);

    let server = ApiServer::new(config, store.clone()).await.unwrap();
    let manual = ManualManager::new("test");
    server.add_shutdown_manager(manual.clone()).unwrap();
    let mut states = server.subscribe_state();
    let running = tokio::spawn(server.prepare_run().unwrap().run());

    states.wait_for(|s| *s == ServerState::Running).await.unwrap();
    wait_for_port(http_addr).await;
    wait_for_port(rpc_addr).await;

    let report = manual.trigger().await.expect("manual manager should win");
    assert_eq!(report.requested_by, "test");
    assert_eq!(report.callbacks_run, 4);
    assert!(report.is_clean());

    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("run should return after shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(*states.borrow(), ServerState::Stopped);

    assert!(wait_until_refused(http_addr, Duration::from_secs(2)).await);
    assert!(wait_until_refused(rpc_addr, Duration::from_secs(2)).await);
    assert!(matches!(
        store.get_by_username("alice").await,
        Err(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_failing_callback_does_not_stop_the_chain() {
    let config = test_config(28321, 28322);
    let http_addr = addr(&config.http.bind_address);
    let rpc_addr = addr(&config.rpc.bind_address);
    let store = FailingCloseStore::new(MemoryUserStore::with_seed_users(&config.users));

    let server = ApiServer::new(config, store.clone()).await.unwrap();
    let manual = ManualManager::new("test");
    server.add_shutdown_manager(manual.clone()).unwrap();
    let mut states = server.subscribe_state();
    let running = tokio::spawn(server.prepare_run().unwrap().run());
    states.wait_for(|s| *s == ServerState::Running).await.unwrap();
    wait_for_port(http_addr).await;

    let report = manual.trigger().await.unwrap();
    assert_eq!(report.callbacks_run, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "store-close");
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);

    let err = running.await.unwrap().unwrap_err();
    match err {
        ServerError::Shutdown(ShutdownError::Callbacks(failures)) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].message.contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Listeners closed before the failing callback ran.
    assert!(wait_until_refused(http_addr, Duration::from_secs(2)).await);
    assert!(wait_until_refused(rpc_addr, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_concurrent_triggers_run_cleanup_once() {
    let config = test_config(28331, 28332);
    let http_addr = addr(&config.http.bind_address);
    let store = FailingCloseStore::new(MemoryUserStore::with_seed_users(&config.users));

    let server = ApiServer::new(config, store.clone()).await.unwrap();
    let managers: Vec<Arc<ManualManager>> = (0..4)
        .map(|i| ManualManager::new(format!("manual-{i}")))
        .collect();
    for manager in &managers {
        server.add_shutdown_manager(manager.clone()).unwrap();
    }
    let mut states = server.subscribe_state();
    let running = tokio::spawn(server.prepare_run().unwrap().run());
    states.wait_for(|s| *s == ServerState::Running).await.unwrap();
    wait_for_port(http_addr).await;

    let triggers: Vec<_> = managers
        .iter()
        .cloned()
        .map(|m| tokio::spawn(async move { m.trigger().await }))
        .collect();
    let mut winners = 0;
    for trigger in triggers {
        if trigger.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let _ = running.await.unwrap();
    assert_eq!(store.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_address_fails_startup() {
    let first_config = test_config(28341, 28342);
    let http_addr = addr(&first_config.http.bind_address);
    let first = ApiServer::new(first_config.clone(), seeded_store(&first_config))
        .await
        .unwrap();
    let manual = ManualManager::new("first");
    first.add_shutdown_manager(manual.clone()).unwrap();
    let mut states = first.subscribe_state();
    let running = tokio::spawn(first.prepare_run().unwrap().run());
    states.wait_for(|s| *s == ServerState::Running).await.unwrap();

    // Same HTTP port, free RPC port.
    let mut second_config = first_config.clone();
    second_config.rpc.bind_address = "127.0.0.1:28343".into();
    let second_store = seeded_store(&second_config);
    let second = ApiServer::new(second_config, second_store.clone()).await.unwrap();
    let mut second_states = second.subscribe_state();
    let err = second.prepare_run().unwrap().run().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }), "got {err}");
    assert_eq!(*second_states.borrow_and_update(), ServerState::Stopped);
    assert!(second_store.get_by_username("alice").await.is_err());

    // The first server is unaffected.
    let resp = client()
        .get(format!("http://{http_addr}/healthz"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    manual.trigger().await.unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_in_flight_calls_complete_during_shutdown() {
    let config = test_config(28351, 28352);
    let http_addr = addr(&config.http.bind_address);
    let rpc_addr = addr(&config.rpc.bind_address);
    let store = SlowLookupStore::new(
        MemoryUserStore::with_seed_users(&config.users),
        Duration::from_millis(800),
    );
    let server = ApiServer::new(config, store.clone()).await.unwrap();
    let manual = ManualManager::new("test");
    server.add_shutdown_manager(manual.clone()).unwrap();
    let mut states = server.subscribe_state();
    let running = tokio::spawn(server.prepare_run().unwrap().run());
    states.wait_for(|s| *s == ServerState::Running).await.unwrap();
    wait_for_port(http_addr).await;
    wait_for_port(rpc_addr).await;

    let login = tokio::spawn(async move {
        client()
            .post(format!("http://{http_addr}/login"))
            .json(&serde_json::json!({ "username": "alice", "password": PASSWORD }))
            .send()
            .await
    });
    store.entered.notified().await;

    let mut rpc = UserServiceClient::connect(format!("http://{rpc_addr}"))
        .await
        .unwrap();
    let get_user = tokio::spawn(async move {
        rpc.get_user(GetUserRequest {
            username: "bob".into(),
        })
        .await
    });
    store.entered.notified().await;

    // Both requests are inside the store when shutdown starts.
    let report = manual.trigger().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);

    let login = login.await.unwrap().expect("login should drain, not be dropped");
    assert_eq!(login.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = login.json().await.unwrap();
    assert!(body["token"].is_string());

    let bob = get_user.await.unwrap().expect("rpc call should drain").into_inner();
    assert_eq!(bob.name, "bob");

    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_hung_rpc_call_is_bounded_by_drain_timeout() {
    let mut config = test_config(28361, 28362);
    config.rpc.drain_timeout_secs = Some(1);
    let rpc_addr = addr(&config.rpc.bind_address);
    let store = SlowLookupStore::new(
        MemoryUserStore::with_seed_users(&config.users),
        Duration::from_secs(60),
    );
    let server = ApiServer::new(config, store.clone()).await.unwrap();
    let manual = ManualManager::new("test");
    server.add_shutdown_manager(manual.clone()).unwrap();
    let mut states = server.subscribe_state();
    let running = tokio::spawn(server.prepare_run().unwrap().run());
    states.wait_for(|s| *s == ServerState::Running).await.unwrap();
    wait_for_port(rpc_addr).await;

    let mut rpc = UserServiceClient::connect(format!("http://{rpc_addr}"))
        .await
        .unwrap();
    let hung = tokio::spawn(async move {
        rpc.get_user(GetUserRequest {
            username: "alice".into(),
        })
        .await
    });
    store.entered.notified().await;

    let started = tokio::time::Instant::now();
    let report = manual.trigger().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.callbacks_run, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].name, "rpc-close");
    assert!(report.failures[0].message.contains("did not drain"));

    // The rest of the chain still ran.
    assert!(matches!(
        store.inner.get_by_username("alice").await,
        Err(StoreError::Unavailable(_))
    ));
    assert!(matches!(
        running.await.unwrap(),
        Err(ServerError::Shutdown(ShutdownError::Callbacks(_)))
    ));
    hung.abort();
}

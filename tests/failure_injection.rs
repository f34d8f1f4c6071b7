//! Failure injection tests for the hub and registrants.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get, Router};
use reqwest::StatusCode;

use rendezvous_proxy::net::{dial, Network};
use rendezvous_proxy::registry::Selection;
use rendezvous_proxy::{serve, Listener, ListenerError, Registration, Shutdown};

mod common;

/// An address nothing listens on.
fn dead_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn registrant_hangup_evicts_standby() {
    let hub = common::start_hub(Selection::Fifo).await;
    let registration = Registration::parse("http://x.example/").unwrap();

    let first = dial(Network::Tcp, &hub.registration.to_string(), &registration)
        .await
        .unwrap();
    let _second = dial(Network::Tcp, &hub.registration.to_string(), &registration)
        .await
        .unwrap();
    common::wait_for_standby(&hub.registry, 2).await;

    drop(first);
    common::wait_for_standby(&hub.registry, 1).await;
}

#[tokio::test]
async fn dead_registrant_is_never_handed_out() {
    let hub = common::start_hub(Selection::Fifo).await;
    let registration = Registration::parse("http://x.example/").unwrap();

    let standby = dial(Network::Tcp, &hub.registration.to_string(), &registration)
        .await
        .unwrap();
    common::wait_for_standby(&hub.registry, 1).await;
    drop(standby);
    common::wait_for_standby(&hub.registry, 0).await;

    let response = common::client()
        .get(format!("http://{}/", hub.forwarding))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unreachable_hub_fails_accept_without_leaking_slots() {
    let config = common::registrant_config(dead_address(), "http://x.example/", 1);
    let listener = Listener::new(&config).unwrap();

    for _ in 0..3 {
        let err = listener.accept().await.unwrap_err();
        assert!(matches!(err, ListenerError::Dial { .. }));
    }
    assert_eq!(listener.outstanding(), 0);
}

#[tokio::test]
async fn serve_retries_until_shutdown() {
    let config = common::registrant_config(dead_address(), "http://x.example/", 2);
    let listener = Listener::new(&config).unwrap();
    let router = Router::new().route("/", get(|| async { "unreachable" }));
    let shutdown = Shutdown::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), serve(&listener, router, &shutdown))
        .await
        .expect("serve should stop on shutdown");
    assert!(result.is_ok());
    assert!(listener.is_closed());
    assert_eq!(listener.outstanding(), 0);
}

#[tokio::test]
async fn hub_shutdown_returns_registrant_slots() {
    let hub = common::start_hub(Selection::Fifo).await;
    let router = Router::new().route("/", get(|| async { "ok" }));
    let registrant = common::start_registrant(hub.registration, "http://x.example/", 2, router);
    common::wait_for_standby(&hub.registry, 2).await;

    hub.shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(5), hub.handle).await;

    // Drained standbys close on the registrant side, which frees their slots.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registrant.listener.outstanding() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "slots were not returned");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    registrant.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), registrant.handle)
        .await
        .expect("registrant should stop")
        .unwrap();
}

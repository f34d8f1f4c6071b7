//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use rendezvous_proxy::config::{BackoffConfig, HubConfig, RegistrantConfig};
use rendezvous_proxy::registry::{Registry, Selection};
use rendezvous_proxy::{serve, HubServer, Listener, Shutdown};

/// A hub running on ephemeral ports.
#[allow(dead_code)]
pub struct TestHub {
    pub forwarding: SocketAddr,
    pub registration: SocketAddr,
    pub registry: Arc<Registry>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Start a hub with the given standby selection.
pub async fn start_hub(selection: Selection) -> TestHub {
    let forwarding = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let registration = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let forwarding_addr = forwarding.local_addr().unwrap();
    let registration_addr = registration.local_addr().unwrap();

    let mut config = HubConfig::default();
    config.registry.selection = selection;
    config.timeouts.drain_secs = 1;

    let hub = HubServer::new(config);
    let registry = hub.registry();
    let shutdown = Shutdown::new();

    let task_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { hub.serve(forwarding, registration, &task_shutdown).await });

    TestHub {
        forwarding: forwarding_addr,
        registration: registration_addr,
        registry,
        shutdown,
        handle,
    }
}

/// Registrant configuration pointing at `hub`.
#[allow(dead_code)]
pub fn registrant_config(hub: SocketAddr, registration: &str, pool_size: usize) -> RegistrantConfig {
    RegistrantConfig {
        hub_address: hub.to_string(),
        registration: registration.to_string(),
        pool_size,
        backoff: BackoffConfig {
            base_delay_ms: 10,
            max_delay_ms: 100,
        },
        ..RegistrantConfig::default()
    }
}

/// A registrant serving a router through the hub.
#[allow(dead_code)]
pub struct TestRegistrant {
    pub listener: Arc<Listener>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

/// Serve `router` through the hub at `hub` under `registration`.
#[allow(dead_code)]
pub fn start_registrant(hub: SocketAddr, registration: &str, pool_size: usize, router: Router) -> TestRegistrant {
    let listener = Arc::new(Listener::new(&registrant_config(hub, registration, pool_size)).unwrap());
    let shutdown = Shutdown::new();

    let task_listener = Arc::clone(&listener);
    let task_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        serve(&task_listener, router, &task_shutdown).await.unwrap();
    });

    TestRegistrant {
        listener,
        shutdown,
        handle,
    }
}

/// Wait until the registry holds exactly `count` standby connections.
pub async fn wait_for_standby(registry: &Registry, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.len() != count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {} standby connections, have {}",
            count,
            registry.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// HTTP client that never goes through a proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

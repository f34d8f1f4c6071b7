//! Hub server setup.
//!
//! # Responsibilities
//! - Build the registration router around the shared registry
//! - Run the forwarding endpoint's raw accept loop
//! - Bind both endpoints and serve them concurrently
//! - Stop both on shutdown and release every standby connection

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{EndpointConfig, HubConfig};
use crate::http::forward::{forward, HubState};
use crate::http::register::register_handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::net::dial::Network;
use crate::registry::Registry;

/// What a bound endpoint serves.
enum Endpoint {
    Registration(Router),
    Forwarding { state: HubState, head_timeout: Duration },
}

/// The rendezvous hub: a registration endpoint and a forwarding endpoint
/// sharing one standby registry.
pub struct HubServer {
    config: HubConfig,
    state: HubState,
}

impl HubServer {
    /// Create a hub with an empty registry.
    pub fn new(config: HubConfig) -> Self {
        let registry = Registry::new(config.registry.selection);
        Self {
            state: HubState::new(registry),
            config,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    /// Router for the registration endpoint.
    #[allow(deprecated)]
    pub fn registration_router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(register_handler))
            .route("/", any(register_handler))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        self.config.timeouts.registration_secs,
                    ))),
            )
    }

    fn forwarding(&self) -> Endpoint {
        Endpoint::Forwarding {
            state: self.state.clone(),
            head_timeout: Duration::from_secs(self.config.timeouts.request_head_secs),
        }
    }

    /// Serve both endpoints on already-bound listeners until shutdown.
    pub async fn serve<F, R>(self, forwarding: F, registration: R, shutdown: &Shutdown) -> std::io::Result<()>
    where
        F: axum::serve::Listener,
        F::Addr: std::fmt::Debug,
        R: axum::serve::Listener,
        R::Addr: std::fmt::Debug,
    {
        let forwarding = serve_endpoint(forwarding, self.forwarding(), shutdown.subscribe());
        let registration = serve_endpoint(
            registration,
            Endpoint::Registration(self.registration_router()),
            shutdown.subscribe(),
        );
        self.run_until_shutdown(async move { tokio::try_join!(forwarding, registration).map(|_| ()) }, shutdown)
            .await
    }

    /// Bind both configured endpoints and serve them until shutdown.
    pub async fn run(self, shutdown: &Shutdown) -> std::io::Result<()> {
        let forwarding = bind_and_serve(
            "forwarding",
            &self.config.forwarding,
            self.forwarding(),
            shutdown.subscribe(),
        );
        let registration = bind_and_serve(
            "registration",
            &self.config.registration,
            Endpoint::Registration(self.registration_router()),
            shutdown.subscribe(),
        );
        let endpoints = async move { tokio::try_join!(forwarding, registration).map(|_| ()) };
        self.run_until_shutdown(endpoints, shutdown).await
    }

    async fn run_until_shutdown<S>(&self, endpoints: S, shutdown: &Shutdown) -> std::io::Result<()>
    where
        S: Future<Output = std::io::Result<()>>,
    {
        let mut signal = shutdown.subscribe();
        tokio::pin!(endpoints);

        let result = tokio::select! {
            result = &mut endpoints => result,
            _ = signal.recv() => {
                let drain = Duration::from_secs(self.config.timeouts.drain_secs);
                tracing::info!(
                    drain_secs = drain.as_secs(),
                    active_sessions = self.state.sessions.active_count(),
                    "Hub shutting down"
                );
                match tokio::time::timeout(drain, &mut endpoints).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            active_sessions = self.state.sessions.active_count(),
                            "Drain timed out; abandoning in-flight sessions"
                        );
                        Ok(())
                    }
                }
            }
        };

        self.state.registry.drain();
        tracing::info!("Hub stopped");
        result
    }
}

async fn serve_endpoint<L>(listener: L, endpoint: Endpoint, mut signal: broadcast::Receiver<()>) -> std::io::Result<()>
where
    L: axum::serve::Listener,
    L::Addr: std::fmt::Debug,
{
    match endpoint {
        Endpoint::Registration(router) => {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = signal.recv().await;
                })
                .await
        }
        Endpoint::Forwarding { state, head_timeout } => {
            serve_forwarding(listener, state, head_timeout, signal).await;
            Ok(())
        }
    }
}

/// Accept client connections and bridge each one until shutdown, then wait
/// for the sessions still running.
async fn serve_forwarding<L>(
    mut listener: L,
    state: HubState,
    head_timeout: Duration,
    mut signal: broadcast::Receiver<()>,
) where
    L: axum::serve::Listener,
    L::Addr: std::fmt::Debug,
{
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = signal.recv() => break,
            (io, peer) = listener.accept() => {
                tracing::trace!(peer = ?peer, "Client connected");
                let state = state.clone();
                sessions.spawn(async move {
                    forward(io, &state.registry, &state.sessions, head_timeout).await;
                });
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    drop(listener);
    if !sessions.is_empty() {
        tracing::info!(sessions = sessions.len(), "Waiting for bridge sessions");
    }
    while sessions.join_next().await.is_some() {}
}

async fn bind_and_serve(
    name: &'static str,
    config: &EndpointConfig,
    endpoint: Endpoint,
    signal: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    match config.network {
        Network::Tcp => {
            let listener = TcpListener::bind(&config.bind_address).await?;
            tracing::info!(endpoint = name, address = %listener.local_addr()?, "Listening");
            serve_endpoint(listener, endpoint, signal).await
        }
        Network::Unix => bind_and_serve_unix(name, &config.bind_address, endpoint, signal).await,
    }
}

#[cfg(unix)]
async fn bind_and_serve_unix(
    name: &'static str,
    path: &str,
    endpoint: Endpoint,
    signal: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    // A socket file left by a previous run would make bind fail.
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(endpoint = name, path, "Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let listener = tokio::net::UnixListener::bind(path)?;
    tracing::info!(endpoint = name, path, "Listening");
    serve_endpoint(listener, endpoint, signal).await
}

#[cfg(not(unix))]
async fn bind_and_serve_unix(
    _name: &'static str,
    _path: &str,
    _endpoint: Endpoint,
    _signal: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix sockets are not supported on this platform",
    ))
}

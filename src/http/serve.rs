//! Serving an application through the outbound listener.
//!
//! # Responsibilities
//! - Pull registered connections from a [`Listener`] in a loop
//! - Serve an axum [`Router`] on each one with HTTP/1.1
//! - Redial with backoff while the hub is unreachable
//!
//! # Design Decisions
//! - No header-read or idle timeouts: a registered connection may sit idle
//!   on the hub indefinitely before its first request arrives
//! - Keep-alive is off; closing after the response is what ends the hub's
//!   bridge session
//! - Shutdown closes the listener; sessions already running finish on their own

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;

use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError, RegisteredConn};
use crate::resilience::Backoff;

/// Serve `router` over connections registered with the hub until the
/// listener is closed or shutdown is triggered.
///
/// Transient dial and registration failures are retried with backoff; any
/// other error is returned.
pub async fn serve(listener: &Listener, router: Router, shutdown: &Shutdown) -> Result<(), ListenerError> {
    let mut signal = shutdown.subscribe();
    let mut backoff = Backoff::new(listener.backoff());

    tracing::info!(
        registration = %listener.registration(),
        pool_size = listener.pool_size(),
        "Serving through hub"
    );

    loop {
        let accepted = tokio::select! {
            _ = signal.recv() => {
                listener.close();
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                backoff.reset();
                tokio::spawn(serve_conn(conn, router.clone()));
            }
            Err(ListenerError::Closed) => break,
            Err(e) if e.is_retryable() => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    failures = backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Registration failed; retrying"
                );
                tokio::select! {
                    _ = signal.recv() => {
                        listener.close();
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(outstanding = listener.outstanding(), "Stopped serving through hub");
    Ok(())
}

async fn serve_conn(conn: RegisteredConn, router: Router) {
    let id = conn.id();
    let service = TowerToHyperService::new(router);

    if let Err(e) = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(conn), service)
        .with_upgrades()
        .await
    {
        tracing::debug!(connection_id = %id, error = %e, "Registered connection ended with error");
    }
}

//! Outbound registering listener with admission control.
//!
//! # Responsibilities
//! - Present an accept loop whose connections are dialed *out* to a hub
//! - Register every dialed connection before handing it to the caller
//! - Bound how many registered, unconsumed connections exist at once
//!
//! # Design Decisions
//! - A semaphore holds one permit per outstanding connection; a permit is
//!   taken before dialing and released by the failure-triggered hook
//! - Closing the listener closes the semaphore, waking every waiter
//! - Connections already handed out are never interrupted by `close`

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::StatusCode;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{BackoffConfig, RegistrantConfig};
use crate::net::connection::ConnectionId;
use crate::net::dial::{dial, Network};
use crate::net::hook::{ConnEndHook, FirePolicy, HookedConn};
use crate::observability::metrics;
use crate::protocol::{ProtocolError, Registration};

/// Largest pool size a listener can admit.
pub const MAX_POOL_SIZE: usize = Semaphore::MAX_PERMITS;

/// A registered connection returned by [`Listener::accept`].
pub type RegisteredConn = HookedConn<TokioIo<Upgraded>>;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The registration URL could not be turned into a REGISTER message.
    #[error(transparent)]
    InvalidRegistration(#[from] ProtocolError),

    /// The hub could not be reached.
    #[error("failed to dial hub at {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The REGISTER exchange failed at the HTTP layer.
    #[error("registration handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    /// The hub answered REGISTER with something other than a protocol switch.
    #[error("hub rejected registration with status {0}")]
    Rejected(StatusCode),

    /// The hub accepted but the raw transport could not be taken back.
    #[error("failed to take over registered connection: {0}")]
    Upgrade(#[source] hyper::Error),

    /// The pool size cannot be represented by the admission semaphore.
    #[error("pool size {size} exceeds the maximum of {max}")]
    PoolSizeTooLarge { size: usize, max: usize },

    /// The configured network cannot be used on this platform.
    #[error("{0} sockets are not supported on this platform")]
    UnsupportedNetwork(Network),

    /// The listener was closed; stop calling `accept`.
    #[error("listener closed")]
    Closed,
}

impl ListenerError {
    /// Whether a later `accept` may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ListenerError::Dial { .. }
                | ListenerError::Handshake(_)
                | ListenerError::Rejected(_)
                | ListenerError::Upgrade(_)
        )
    }
}

/// Outstanding-connection accounting shared with the hooks.
struct Pool {
    slots: Arc<Semaphore>,
    leases: Mutex<HashMap<ConnectionId, OwnedSemaphorePermit>>,
}

impl Pool {
    fn lease(&self, id: ConnectionId, permit: OwnedSemaphorePermit) -> usize {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        leases.insert(id, permit);
        leases.len()
    }

    fn outstanding(&self) -> usize {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ConnEndHook for Pool {
    fn conn_ended(&self, id: ConnectionId) {
        let (permit, outstanding) = {
            let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
            (leases.remove(&id), leases.len())
        };
        metrics::record_pool_outstanding(outstanding);
        if permit.is_some() {
            tracing::debug!(connection_id = %id, outstanding, "Registered connection ended");
        }
        // Dropping the permit wakes the oldest waiting accept.
        drop(permit);
    }
}

/// A listener whose connections are registered outbound with a hub.
pub struct Listener {
    network: Network,
    address: String,
    registration: Registration,
    pool_size: usize,
    backoff: BackoffConfig,
    pool: Arc<Pool>,
}

impl Listener {
    /// Create a listener from a registrant configuration.
    ///
    /// Nothing is dialed until [`accept`](Self::accept) is called.
    pub fn new(config: &RegistrantConfig) -> Result<Self, ListenerError> {
        let registration = Registration::parse(&config.registration)?;
        let pool_size = config.effective_pool_size();
        if pool_size > MAX_POOL_SIZE {
            return Err(ListenerError::PoolSizeTooLarge {
                size: pool_size,
                max: MAX_POOL_SIZE,
            });
        }

        tracing::info!(
            network = %config.network,
            hub_address = %config.hub_address,
            registration = %registration,
            pool_size,
            "Registering listener created"
        );

        Ok(Self {
            network: config.network,
            address: config.hub_address.clone(),
            registration,
            pool_size,
            backoff: config.backoff.clone(),
            pool: Arc::new(Pool {
                slots: Arc::new(Semaphore::new(pool_size)),
                leases: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Dial the hub and return the next registered connection.
    ///
    /// Waits while `pool_size` registered connections are outstanding. A
    /// failed dial or registration leaves the outstanding count unchanged.
    pub async fn accept(&self) -> Result<RegisteredConn, ListenerError> {
        let permit = Arc::clone(&self.pool.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let io = dial(self.network, &self.address, &self.registration).await?;

        let id = ConnectionId::new();
        let outstanding = self.pool.lease(id, permit);
        metrics::record_pool_outstanding(outstanding);

        tracing::debug!(
            connection_id = %id,
            hub_address = %self.address,
            outstanding,
            "Connection registered"
        );

        let hook: Arc<dyn ConnEndHook> = Arc::clone(&self.pool) as Arc<dyn ConnEndHook>;
        Ok(HookedConn::new(io, id, FirePolicy::OnFailure, hook))
    }

    /// Stop accepting. Pending and future `accept` calls return [`ListenerError::Closed`].
    pub fn close(&self) {
        if !self.pool.slots.is_closed() {
            self.pool.slots.close();
            tracing::info!(hub_address = %self.address, "Registering listener closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.slots.is_closed()
    }

    /// Placeholder address; this listener binds nothing locally.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    }

    /// Registered connections not yet ended.
    pub fn outstanding(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Redial backoff used by [`serve`](fn@crate::http::serve).
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("registration", &self.registration.as_str())
            .field("pool_size", &self.pool_size)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(registration: &str, pool_size: usize) -> RegistrantConfig {
        RegistrantConfig {
            hub_address: "127.0.0.1:1".to_string(),
            registration: registration.to_string(),
            pool_size,
            ..RegistrantConfig::default()
        }
    }

    #[test]
    fn zero_pool_size_defaults_to_five() {
        let listener = Listener::new(&config("http://x.example/", 0)).unwrap();
        assert_eq!(listener.pool_size(), 5);
        assert_eq!(listener.outstanding(), 0);
        assert_eq!(listener.local_addr().port(), 0);
    }

    #[test]
    fn invalid_registration_is_rejected() {
        let err = Listener::new(&config("nope", 1)).unwrap_err();
        assert!(matches!(err, ListenerError::InvalidRegistration(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let err = Listener::new(&config("http://x.example/", usize::MAX)).unwrap_err();
        assert!(matches!(
            err,
            ListenerError::PoolSizeTooLarge { size: usize::MAX, max: MAX_POOL_SIZE }
        ));
        assert!(!err.is_retryable());

        let listener = Listener::new(&config("http://x.example/", MAX_POOL_SIZE)).unwrap();
        assert_eq!(listener.pool_size(), MAX_POOL_SIZE);
    }

    #[tokio::test]
    async fn accept_after_close_fails() {
        let listener = Listener::new(&config("http://x.example/", 1)).unwrap();
        listener.close();
        listener.close();
        assert!(listener.is_closed());
        assert!(matches!(listener.accept().await, Err(ListenerError::Closed)));
    }

    #[tokio::test]
    async fn failed_dial_leaves_count_unchanged() {
        let listener = Listener::new(&config("http://x.example/", 1)).unwrap();
        for _ in 0..3 {
            let err = listener.accept().await.unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(listener.outstanding(), 0);
    }
}

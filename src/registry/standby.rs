//! Standby connection registry.
//!
//! # Responsibilities
//! - Hold registered standby connections in arrival order
//! - Hand each standby to exactly one taker
//! - Evict standbys whose registrant went away before hand-off
//!
//! # Design Decisions
//! - One mutex guards the queue; it is never held across an await
//! - Every standby is owned by a small supervisor task until claimed, so a
//!   registrant hanging up is noticed without anyone touching the queue
//! - The close-triggered hook is the only eviction path; whoever removes an
//!   entry from the queue first wins it

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;

use crate::net::connection::ConnectionId;
use crate::net::hook::{ConnEndHook, FirePolicy, HookedConn};
use crate::observability::metrics;
use crate::protocol::Registration;
use crate::routing::{AndMatcher, Matcher};

/// A standby connection handed out by [`Registry::take`].
pub type StandbyConn<T = TokioIo<Upgraded>> = HookedConn<T>;

type Claim<T> = oneshot::Sender<StandbyConn<T>>;

/// Errors returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No live standby connection could be handed out.
    #[error("no standby connection available")]
    NotFound,
}

/// How [`Registry::take`] chooses among standby connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Oldest standby, regardless of the request's host and path.
    #[default]
    Fifo,
    /// Oldest standby whose registration pattern matches the request.
    Pattern,
}

struct StandbyEntry<T> {
    id: ConnectionId,
    matcher: AndMatcher,
    claim: oneshot::Sender<Claim<T>>,
}

/// FIFO store of standby connections shared by both hub endpoints.
pub struct Registry<T = TokioIo<Upgraded>> {
    entries: Mutex<VecDeque<StandbyEntry<T>>>,
    selection: Selection,
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub fn new(selection: Selection) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(VecDeque::new()),
            selection,
        })
    }

    /// Number of standby connections currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove the entry for `id`. Returns false if it was already taken or removed.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut entries = self.lock();
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let removed = entries.remove(index);
        metrics::record_standby(entries.len());
        drop(entries);
        // The entry's claim channel closes here, which tells its supervisor to let go.
        drop(removed);
        true
    }

    /// Release every standby connection. Returns how many were held.
    pub fn drain(&self) -> usize {
        let drained: Vec<StandbyEntry<T>> = self.lock().drain(..).collect();
        metrics::record_standby(0);
        let count = drained.len();
        drop(drained);
        if count > 0 {
            tracing::info!(released = count, "Registry drained");
        }
        count
    }

    fn pop(&self, host: &str, path: &str) -> Option<StandbyEntry<T>> {
        let mut entries = self.lock();
        let index = match self.selection {
            Selection::Fifo => (!entries.is_empty()).then_some(0),
            Selection::Pattern => entries.iter().position(|e| e.matcher.matches(host, path)),
        };
        let entry = index.and_then(|i| entries.remove(i));
        metrics::record_standby(entries.len());
        entry
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StandbyEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Registry<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Store a freshly registered transport as a standby connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(self: &Arc<Self>, conn: T, registration: &Registration) -> ConnectionId {
        let id = ConnectionId::new();
        let hook: Arc<dyn ConnEndHook> = Arc::clone(self) as Arc<dyn ConnEndHook>;
        let conn = HookedConn::new(conn, id, FirePolicy::OnClose, hook);
        let (claim_tx, claim_rx) = oneshot::channel();

        let standby = {
            let mut entries = self.lock();
            entries.push_back(StandbyEntry {
                id,
                matcher: AndMatcher::for_registration(registration),
                claim: claim_tx,
            });
            entries.len()
        };
        metrics::record_standby(standby);

        tracing::info!(
            connection_id = %id,
            registration = %registration,
            standby,
            "Standby connection added"
        );

        tokio::spawn(supervise(conn, claim_rx));
        id
    }

    /// Take the oldest eligible standby connection.
    ///
    /// With [`Selection::Fifo`] the host and path are ignored. A standby that
    /// ends while being claimed is skipped.
    pub async fn take(&self, host: &str, path: &str) -> Result<StandbyConn<T>, RegistryError> {
        loop {
            let entry = self.pop(host, path).ok_or(RegistryError::NotFound)?;

            let (reply_tx, reply_rx) = oneshot::channel();
            if entry.claim.send(reply_tx).is_err() {
                tracing::debug!(connection_id = %entry.id, "Standby ended before hand-off");
                continue;
            }

            match reply_rx.await {
                Ok(conn) => {
                    tracing::info!(connection_id = %entry.id, host, path, "Standby connection taken");
                    return Ok(conn);
                }
                Err(_) => {
                    tracing::debug!(connection_id = %entry.id, "Standby ended before hand-off");
                }
            }
        }
    }
}

impl<T> ConnEndHook for Registry<T>
where
    T: Send + 'static,
{
    fn conn_ended(&self, id: ConnectionId) {
        if self.remove(id) {
            tracing::info!(connection_id = %id, "Standby connection evicted");
        }
    }
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("selection", &self.selection)
            .field("standby", &self.len())
            .finish()
    }
}

/// Own a standby connection until it is claimed or its registrant hangs up.
///
/// A registrant never speaks first, so any read completion means the
/// connection is unusable.
async fn supervise<T>(mut conn: StandbyConn<T>, claims: oneshot::Receiver<Claim<T>>)
where
    T: AsyncRead + Unpin,
{
    let id = conn.id();
    let mut peek = [0u8; 1];

    // Death wins over a simultaneous claim so a dead standby is never handed out.
    tokio::select! {
        biased;
        read = conn.read(&mut peek) => match read {
            Ok(0) => tracing::debug!(connection_id = %id, "Registrant closed standby connection"),
            Ok(_) => tracing::warn!(connection_id = %id, "Unexpected data on standby connection, closing"),
            Err(e) => tracing::debug!(connection_id = %id, error = %e, "Standby connection failed"),
        },
        claim = claims => match claim {
            Ok(reply) => {
                if reply.send(conn).is_err() {
                    tracing::debug!(connection_id = %id, "Taker went away, closing standby");
                }
            }
            Err(_) => tracing::debug!(connection_id = %id, "Standby released by registry"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn registration(url: &str) -> Registration {
        Registration::parse(url).unwrap()
    }

    fn register(registry: &Arc<Registry<DuplexStream>>, url: &str) -> (ConnectionId, DuplexStream) {
        let (hub_side, registrant_side) = duplex(1024);
        let id = registry.add(hub_side, &registration(url));
        (id, registrant_side)
    }

    async fn wait_until_empty(registry: &Registry<DuplexStream>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry never emptied");
    }

    #[tokio::test]
    async fn take_is_fifo() {
        let registry = Registry::new(Selection::Fifo);
        let (r1, _c1) = register(&registry, "http://a.example/");
        let (r2, _c2) = register(&registry, "http://b.example/");
        let (r3, _c3) = register(&registry, "http://c.example/");
        assert_eq!(registry.len(), 3);

        let mut taken = Vec::new();
        for _ in 0..3 {
            taken.push(registry.take("ignored.example", "/ignored").await.unwrap());
        }

        let ids: Vec<_> = taken.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![r1, r2, r3]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn empty_registry_reports_not_found() {
        let registry: Arc<Registry<DuplexStream>> = Registry::new(Selection::Fifo);
        assert_eq!(registry.take("x", "/").await.unwrap_err(), RegistryError::NotFound);
    }

    #[tokio::test]
    async fn taken_connection_carries_bytes() {
        let registry = Registry::new(Selection::Fifo);
        let (_id, mut registrant) = register(&registry, "http://x.example/test/*");

        let mut standby = registry.take("x.example", "/test/a").await.unwrap();
        standby.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = [0u8; 18];
        registrant.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[tokio::test]
    async fn remove_evicts_once() {
        let registry = Registry::new(Selection::Fifo);
        let (id, _conn) = register(&registry, "http://x.example/");

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.take("x.example", "/").await.unwrap_err(), RegistryError::NotFound);
    }

    #[tokio::test]
    async fn closing_a_taken_connection_leaves_registry_alone() {
        let registry = Registry::new(Selection::Fifo);
        let (_first, _c1) = register(&registry, "http://a.example/");
        let (second, _c2) = register(&registry, "http://b.example/");

        let mut taken = registry.take("a.example", "/").await.unwrap();
        taken.shutdown().await.unwrap();
        drop(taken);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.take("b.example", "/").await.unwrap().id(), second);
    }

    #[tokio::test]
    async fn registrant_hangup_evicts_standby() {
        let registry = Registry::new(Selection::Fifo);
        let (_id, registrant) = register(&registry, "http://x.example/");
        drop(registrant);

        wait_until_empty(&registry).await;
        assert_eq!(registry.take("x.example", "/").await.unwrap_err(), RegistryError::NotFound);
    }

    #[tokio::test]
    async fn unsolicited_bytes_evict_standby() {
        let registry = Registry::new(Selection::Fifo);
        let (_id, mut registrant) = register(&registry, "http://x.example/");
        registrant.write_all(b"?").await.unwrap();

        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn dead_standby_is_skipped() {
        let registry = Registry::new(Selection::Fifo);
        let (_dead, registrant) = register(&registry, "http://a.example/");
        let (live, _c2) = register(&registry, "http://b.example/");
        drop(registrant);

        // Whether or not eviction already ran, the dead standby is never handed out.
        let taken = registry.take("x", "/").await.unwrap();
        assert_eq!(taken.id(), live);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn hand_off_is_at_most_once() {
        for _ in 0..50 {
            let registry = Registry::new(Selection::Fifo);
            let (id, _registrant) = register(&registry, "http://x.example/");

            let takers: Vec<_> = (0..4)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move { registry.take("x.example", "/").await.map(|c| c.id()) })
                })
                .collect();
            let remover = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.remove(id) })
            };

            let mut winners = 0;
            for taker in takers {
                match taker.await.unwrap() {
                    Ok(taken) => {
                        assert_eq!(taken, id);
                        winners += 1;
                    }
                    Err(e) => assert_eq!(e, RegistryError::NotFound),
                }
            }
            if remover.await.unwrap() {
                winners += 1;
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn pattern_selection_matches_registration() {
        let registry = Registry::new(Selection::Pattern);
        let (api, _c1) = register(&registry, "http://*.api.example/v1/*");
        let (web, _c2) = register(&registry, "http://www.example/");

        assert_eq!(registry.take("www.example", "/").await.unwrap().id(), web);
        assert_eq!(registry.take("eu.api.example:8080", "/v1/users").await.unwrap().id(), api);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn pattern_selection_without_match_leaves_queue_intact() {
        let registry = Registry::new(Selection::Pattern);
        let (_id, _conn) = register(&registry, "http://x.example/test/*");

        assert_eq!(
            registry.take("x.example", "/prod/a").await.unwrap_err(),
            RegistryError::NotFound
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn drain_releases_everything() {
        let registry = Registry::new(Selection::Fifo);
        let (_a, mut c1) = register(&registry, "http://a.example/");
        let (_b, _c2) = register(&registry, "http://b.example/");

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());

        // The supervisor closes the released transport.
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), c1.read(&mut buf)).await.unwrap();
        assert_eq!(read.unwrap(), 0);
    }
}

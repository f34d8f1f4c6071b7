//! Connection lifecycle hook.
//!
//! # Responsibilities
//! - Wrap a raw duplex transport without changing its I/O behavior
//! - Report the end of the transport to an observer exactly once
//! - Support both close-triggered and failure-triggered firing
//!
//! # Design Decisions
//! - One wrapper type, firing policy chosen at construction
//! - The one-shot latch is an atomic compare-exchange, never a lock
//! - Dropping the wrapper counts as closing it

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::connection::ConnectionId;

/// Observer notified when a hooked connection ends.
pub trait ConnEndHook: Send + Sync {
    /// Called at most once per hooked connection.
    fn conn_ended(&self, id: ConnectionId);
}

/// When a [`HookedConn`] reports its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirePolicy {
    /// Fire only when the connection is shut down or dropped.
    OnClose,
    /// Fire on shutdown, drop, the first I/O error, or read end-of-stream.
    OnFailure,
}

/// A transport whose end is reported to a [`ConnEndHook`].
pub struct HookedConn<T> {
    inner: T,
    id: ConnectionId,
    policy: FirePolicy,
    fired: AtomicBool,
    hook: Arc<dyn ConnEndHook>,
}

impl<T> HookedConn<T> {
    /// Wrap `inner`, reporting its end to `hook` according to `policy`.
    pub fn new(inner: T, id: ConnectionId, policy: FirePolicy, hook: Arc<dyn ConnEndHook>) -> Self {
        Self {
            inner,
            id,
            policy,
            fired: AtomicBool::new(false),
            hook,
        }
    }

    /// Identifier handed to the observer.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the end notification has already fired.
    pub fn is_ended(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn fire(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::trace!(connection_id = %self.id, policy = ?self.policy, "Connection ended");
            self.hook.conn_ended(self.id);
        }
    }

    fn fire_on_failure(&self) {
        if self.policy == FirePolicy::OnFailure {
            self.fire();
        }
    }
}

impl<T> fmt::Debug for HookedConn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedConn")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl<T> Drop for HookedConn<T> {
    fn drop(&mut self) {
        self.fire();
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for HookedConn<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let wanted = buf.remaining() > 0;
        let before = buf.filled().len();
        let res = Pin::new(&mut this.inner).poll_read(cx, buf);
        match &res {
            Poll::Ready(Err(_)) => this.fire_on_failure(),
            // Zero bytes into a non-empty buffer is end-of-stream.
            Poll::Ready(Ok(())) if wanted && buf.filled().len() == before => this.fire_on_failure(),
            _ => {}
        }
        res
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for HookedConn<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Err(_)) = &res {
            this.fire_on_failure();
        }
        res
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_flush(cx);
        if let Poll::Ready(Err(_)) = &res {
            this.fire_on_failure();
        }
        res
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.fire();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Err(_)) = &res {
            this.fire_on_failure();
        }
        res
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

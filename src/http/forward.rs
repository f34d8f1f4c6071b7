//! Forwarding endpoint.
//!
//! # Responsibilities
//! - Read each client's request head far enough to learn its host and path
//! - Take a standby connection for the request
//! - Splice the client and the standby together until the registrant is done
//!
//! # Design Decisions
//! - The client transport is owned raw from the start, so it never has to be
//!   hijacked out of an HTTP server
//! - Bytes are relayed untouched in both directions: the request reaches the
//!   registrant exactly as the client sent it, and the registrant's response
//!   reaches the client exactly as it was written
//! - One standby serves one client connection; both close when the
//!   registrant's side ends
//! - Only reading the request head has a deadline; a bridged session has none
//!
//! # Data Flow
//! ```text
//! client ──head──▶ parse_head ──host, path──▶ Registry::take
//!        ◀────────────── splice ──────────────▶ standby
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, Uri};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::connection::{ConnectionId, SessionTracker};
use crate::observability::metrics;
use crate::registry::Registry;

/// Largest request head buffered before a standby is chosen.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

/// State shared by both hub endpoints.
#[derive(Debug, Clone)]
pub struct HubState {
    pub registry: Arc<Registry>,
    pub sessions: SessionTracker,
}

impl HubState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            sessions: SessionTracker::new(),
        }
    }
}

/// Why a client connection was not bridged.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request head exceeds {MAX_HEAD_SIZE} bytes")]
    HeadTooLarge,

    #[error("timed out reading request head")]
    HeadTimeout,

    #[error("client closed before completing its request head")]
    Incomplete,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Routing fields of a client's request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub host: String,
    pub path: String,
}

/// Parse the request head at the front of `buf`.
///
/// Returns `Ok(None)` until the whole head has arrived. The host comes from
/// the `Host` header, falling back to an absolute-form request target.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    if request.parse(buf)?.is_partial() {
        return Ok(None);
    }

    let target = request.path.unwrap_or("/");
    let (target_authority, path) = match target.parse::<Uri>() {
        Ok(uri) if uri.scheme().is_some() => (
            uri.authority().map(|a| a.as_str().to_string()),
            uri.path().to_string(),
        ),
        _ => (None, target.split_once('?').map_or(target, |(p, _)| p).to_string()),
    };

    let host = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("host"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .map(str::to_string)
        .or(target_authority)
        .unwrap_or_default();

    Ok(Some(RequestHead {
        method: request.method.unwrap_or_default().to_string(),
        host,
        path,
    }))
}

/// Bridge one client connection to a standby connection.
///
/// Every failure is answered on the client transport and logged; nothing is
/// returned to the accept loop.
pub async fn forward<C, T>(mut client: C, registry: &Registry<T>, sessions: &SessionTracker, head_timeout: Duration)
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let client_id = ConnectionId::new();
    let mut buf = Vec::with_capacity(4096);

    let head = match tokio::time::timeout(head_timeout, read_head(&mut client, &mut buf)).await {
        Ok(Ok(head)) => head,
        Ok(Err(ForwardError::Incomplete)) => {
            tracing::debug!(client_id = %client_id, "Client left before sending a request");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(client_id = %client_id, error = %e, "Rejecting client request");
            metrics::record_forward("bad_request");
            reject(&mut client, StatusCode::BAD_REQUEST, &e.to_string()).await;
            return;
        }
        Err(_) => {
            let e = ForwardError::HeadTimeout;
            tracing::debug!(client_id = %client_id, error = %e, "Rejecting client request");
            metrics::record_forward("timeout");
            reject(&mut client, StatusCode::REQUEST_TIMEOUT, &e.to_string()).await;
            return;
        }
    };

    let mut standby = match registry.take(&head.host, &head.path).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(client_id = %client_id, host = %head.host, path = %head.path, "No standby connection");
            metrics::record_forward("unavailable");
            reject(&mut client, StatusCode::SERVICE_UNAVAILABLE, &e.to_string()).await;
            return;
        }
    };

    let id = standby.id();
    let session = sessions.track(id);
    tracing::debug!(
        client_id = %client_id,
        connection_id = %id,
        method = %head.method,
        host = %head.host,
        path = %head.path,
        "Forwarding request"
    );

    if let Err(e) = standby.write_all(&buf).await {
        tracing::warn!(connection_id = %id, error = %e, "Failed to write request to standby");
        metrics::record_forward("write_failed");
        reject(&mut client, StatusCode::SERVICE_UNAVAILABLE, "failed to forward request").await;
        return;
    }
    metrics::record_forward("bridged");

    match splice(client, standby).await {
        Ok((up, down)) => {
            tracing::info!(
                connection_id = %session.id(),
                path = %head.path,
                bytes_up = buf.len() as u64 + up,
                bytes_down = down,
                "Bridge session closed"
            );
        }
        Err(e) => {
            tracing::debug!(connection_id = %session.id(), error = %e, "Bridge session ended with error");
        }
    }
}

/// Buffer bytes from `client` until a complete request head is in `buf`.
async fn read_head<C>(client: &mut C, buf: &mut Vec<u8>) -> Result<RequestHead, ForwardError>
where
    C: AsyncRead + Unpin,
{
    loop {
        if let Some(head) = parse_head(buf)? {
            return Ok(head);
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(ForwardError::HeadTooLarge);
        }
        buf.reserve(4096);
        if client.read_buf(buf).await? == 0 {
            return Err(ForwardError::Incomplete);
        }
    }
}

/// Relay bytes both ways until the standby side is exhausted.
///
/// The client finishing its upload does not end the session; the registrant
/// may still be writing its response.
async fn splice<C, S>(client: C, standby: S) -> io::Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite,
    S: AsyncRead + AsyncWrite,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut standby_rd, mut standby_wr) = tokio::io::split(standby);

    let upstream = tokio::io::copy(&mut client_rd, &mut standby_wr);
    let downstream = async {
        let n = tokio::io::copy(&mut standby_rd, &mut client_wr).await?;
        client_wr.shutdown().await?;
        Ok::<u64, io::Error>(n)
    };
    tokio::pin!(upstream, downstream);

    let mut up = 0;
    let mut upstream_open = true;
    loop {
        tokio::select! {
            down = &mut downstream => return down.map(|down| (up, down)),
            sent = &mut upstream, if upstream_open => {
                upstream_open = false;
                match sent {
                    Ok(n) => up = n,
                    Err(e) => tracing::debug!(error = %e, "Client upload ended with error"),
                }
            }
        }
    }
}

/// Answer the client with a plain-text error and close its transport.
async fn reject<C>(client: &mut C, status: StatusCode, message: &str)
where
    C: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        message.len(),
        message
    );
    let written = async {
        client.write_all(response.as_bytes()).await?;
        client.shutdown().await
    };
    if let Err(e) = written.await {
        tracing::debug!(status = %status, error = %e, "Failed to answer client");
    }
}

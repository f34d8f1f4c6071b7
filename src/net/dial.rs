//! Dialing the hub and registering.
//!
//! # Responsibilities
//! - Connect to the hub over TCP or a Unix domain socket
//! - Send the REGISTER message as the first bytes on the transport
//! - Wait for the hub to hand the transport over and return it raw

use std::fmt;
use std::str::FromStr;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::net::listener::ListenerError;
use crate::protocol::Registration;

/// Transport family used to reach or expose an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(format!("unknown network {:?} (expected tcp or unix)", other)),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => f.write_str("tcp"),
            Network::Unix => f.write_str("unix"),
        }
    }
}

/// Dial a single registered connection to a hub.
///
/// The returned transport is positioned right after the hub's
/// `101 Switching Protocols`; the next bytes on it are a forwarded request.
pub async fn dial(
    network: Network,
    address: &str,
    registration: &Registration,
) -> Result<TokioIo<Upgraded>, ListenerError> {
    let request = registration.to_request()?;

    match network {
        Network::Tcp => {
            let stream = TcpStream::connect(address)
                .await
                .map_err(|source| ListenerError::Dial {
                    address: address.to_string(),
                    source,
                })?;
            let _ = stream.set_nodelay(true);
            register(stream, request).await
        }
        Network::Unix => dial_unix(address, request).await,
    }
}

#[cfg(unix)]
async fn dial_unix(address: &str, request: Request<Body>) -> Result<TokioIo<Upgraded>, ListenerError> {
    let stream = tokio::net::UnixStream::connect(address)
        .await
        .map_err(|source| ListenerError::Dial {
            address: address.to_string(),
            source,
        })?;
    register(stream, request).await
}

#[cfg(not(unix))]
async fn dial_unix(_address: &str, _request: Request<Body>) -> Result<TokioIo<Upgraded>, ListenerError> {
    Err(ListenerError::UnsupportedNetwork(Network::Unix))
}

async fn register<IO>(io: IO, request: Request<Body>) -> Result<TokioIo<Upgraded>, ListenerError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(ListenerError::Handshake)?;

    tokio::spawn(async move {
        if let Err(e) = conn.with_upgrades().await {
            tracing::debug!(error = %e, "Registration handshake connection failed");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(ListenerError::Handshake)?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(ListenerError::Rejected(response.status()));
    }

    let upgraded = hyper::upgrade::on(response)
        .await
        .map_err(ListenerError::Upgrade)?;

    Ok(TokioIo::new(upgraded))
}

//! REGISTER message codec.
//!
//! A registration is a URL whose authority is the host pattern and whose
//! path is the path pattern the registrant serves. On the wire it becomes a
//! bodiless request:
//!
//! ```text
//! REGISTER /test/* HTTP/1.1
//! host: *.farm.example.net
//! connection: upgrade
//! upgrade: rendezvous
//! ```
//!
//! The hub parses it with its ordinary HTTP framing and dispatches on the
//! method name, so decoding works on any `http::Request`.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Uri};

use crate::protocol::{METHOD_REGISTER, UPGRADE_PROTOCOL};

/// Errors produced while building or reading a registration.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The registration URL could not be used.
    #[error("invalid registration {url:?}: {reason}")]
    InvalidRegistration { url: String, reason: String },
}

impl ProtocolError {
    fn invalid(url: &str, reason: impl ToString) -> Self {
        ProtocolError::InvalidRegistration {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A parsed registration URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    url: String,
    authority: String,
    path: String,
    query: Option<String>,
}

impl Registration {
    /// Parse a registration URL such as `http://*.example.net/api/*`.
    ///
    /// The authority and path are kept exactly as written: no case folding,
    /// default-port stripping or dot-segment removal.
    pub fn parse(url: &str) -> Result<Self, ProtocolError> {
        let uri: Uri = url.parse().map_err(|e| ProtocolError::invalid(url, e))?;

        if uri.scheme().is_none() {
            return Err(ProtocolError::invalid(url, "missing scheme"));
        }
        let authority = uri
            .authority()
            .map(|a| a.as_str())
            .map(|a| a.rsplit_once('@').map_or(a, |(_, host)| host))
            .filter(|a| !a.is_empty() && !a.starts_with(':'))
            .ok_or_else(|| ProtocolError::invalid(url, "missing host"))?;

        Ok(Self {
            url: url.to_string(),
            authority: authority.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
        })
    }

    /// Host-match pattern (`host[:port]`).
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Path-match pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The URL as supplied by the registrant.
    pub fn as_str(&self) -> &str {
        &self.url
    }

    fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Build the REGISTER request announcing this registration.
    pub fn to_request(&self) -> Result<Request<Body>, ProtocolError> {
        let method = Method::from_bytes(METHOD_REGISTER.as_bytes())
            .map_err(|e| ProtocolError::invalid(&self.url, e))?;
        let host = HeaderValue::from_str(&self.authority)
            .map_err(|e| ProtocolError::invalid(&self.url, e))?;

        Request::builder()
            .method(method)
            .uri(self.target())
            .header(header::HOST, host)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, UPGRADE_PROTOCOL)
            .body(Body::empty())
            .map_err(|e| ProtocolError::invalid(&self.url, e))
    }

    /// Recover the registration carried by a received REGISTER request.
    pub fn from_request<B>(req: &Request<B>) -> Result<Self, ProtocolError> {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| req.uri().authority().map(|a| a.as_str()))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProtocolError::invalid(&req.uri().to_string(), "missing host"))?;

        let path = req.uri().path();
        let query = req.uri().query().map(str::to_string);
        let url = match &query {
            Some(q) => format!("http://{}{}?{}", host, path, q),
            None => format!("http://{}{}", host, path),
        };

        Ok(Self {
            url,
            authority: host.to_string(),
            path: path.to_string(),
            query,
        })
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for Registration {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// True when `req` is a REGISTER message.
pub fn is_register<B>(req: &Request<B>) -> bool {
    req.method().as_str() == METHOD_REGISTER
}

//! Registration endpoint handler.
//!
//! # Responsibilities
//! - Accept only REGISTER messages
//! - Answer `101 Switching Protocols` and take the raw transport over
//! - Hand the transport to the registry as a standby connection

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use crate::http::forward::HubState;
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::protocol::{is_register, Registration, UPGRADE_PROTOCOL};

/// Handle one message on the registration endpoint.
pub async fn register_handler(State(state): State<HubState>, mut request: Request<Body>) -> Response {
    let request_id = request_id(&request).to_string();

    if !is_register(&request) {
        tracing::warn!(request_id = %request_id, method = %request.method(), "Non-REGISTER message on registration endpoint");
        metrics::record_registration("bad_method");
        return (StatusCode::METHOD_NOT_ALLOWED, "invalid http method").into_response();
    }

    let registration = match Registration::from_request(&request) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Malformed registration");
            metrics::record_registration("invalid");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        tracing::error!(request_id = %request_id, registration = %registration, "Registration transport cannot be taken over");
        metrics::record_registration("hijack_failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to hijack connection").into_response();
    };

    // The transport is released only after the 101 below has been written.
    let registry = state.registry.clone();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let id = registry.add(TokioIo::new(upgraded), &registration);
                metrics::record_registration("accepted");
                tracing::info!(
                    request_id = %request_id,
                    connection_id = %id,
                    registration = %registration,
                    standby = registry.len(),
                    "Standby connection registered"
                );
            }
            Err(e) => {
                metrics::record_registration("hijack_failed");
                tracing::warn!(request_id = %request_id, registration = %registration, error = %e, "Registration upgrade failed");
            }
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, UPGRADE_PROTOCOL)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Detect conflicting endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{EndpointConfig, HubConfig, RegistrantConfig};
use crate::net::dial::Network;
use crate::net::listener::MAX_POOL_SIZE;
use crate::protocol::Registration;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: address must not be empty")]
    EmptyAddress { field: &'static str },

    #[error("{field}: {address:?} is not a host:port address")]
    InvalidAddress { field: &'static str, address: String },

    #[error("forwarding and registration endpoints both bind {0:?}")]
    EndpointConflict(String),

    #[error("{field}: must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("registration: {0}")]
    InvalidRegistration(String),

    #[error("pool_size: {size} exceeds the maximum of {max}")]
    PoolSizeTooLarge { size: usize, max: usize },

    #[error("backoff: base_delay_ms ({base}) exceeds max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Validate a hub configuration.
pub fn validate_hub_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_endpoint("forwarding.bind_address", &config.forwarding, &mut errors);
    check_endpoint("registration.bind_address", &config.registration, &mut errors);

    if config.forwarding.network == config.registration.network
        && !config.forwarding.bind_address.is_empty()
        && config.forwarding.bind_address == config.registration.bind_address
    {
        errors.push(ValidationError::EndpointConflict(
            config.forwarding.bind_address.clone(),
        ));
    }

    if config.timeouts.registration_secs == 0 {
        errors.push(ValidationError::ZeroValue {
            field: "timeouts.registration_secs",
        });
    }

    if config.timeouts.request_head_secs == 0 {
        errors.push(ValidationError::ZeroValue {
            field: "timeouts.request_head_secs",
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            address: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a registrant configuration.
pub fn validate_registrant_config(config: &RegistrantConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("hub_address", config.network, &config.hub_address, &mut errors);

    if let Err(e) = Registration::parse(&config.registration) {
        errors.push(ValidationError::InvalidRegistration(e.to_string()));
    }

    if config.pool_size > MAX_POOL_SIZE {
        errors.push(ValidationError::PoolSizeTooLarge {
            size: config.pool_size,
            max: MAX_POOL_SIZE,
        });
    }

    if config.backoff.base_delay_ms > config.backoff.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: config.backoff.base_delay_ms,
            max: config.backoff.max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoint(field: &'static str, endpoint: &EndpointConfig, errors: &mut Vec<ValidationError>) {
    check_address(field, endpoint.network, &endpoint.bind_address, errors);
}

fn check_address(field: &'static str, network: Network, address: &str, errors: &mut Vec<ValidationError>) {
    if address.is_empty() {
        errors.push(ValidationError::EmptyAddress { field });
        return;
    }
    if network == Network::Tcp && !has_port(address) {
        errors.push(ValidationError::InvalidAddress {
            field,
            address: address.to_string(),
        });
    }
}

fn has_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false)
}

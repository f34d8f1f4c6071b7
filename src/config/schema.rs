//! Configuration schema definitions.
//!
//! This module defines the configuration structures for the hub and for
//! registrants. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

use crate::net::dial::Network;
use crate::registry::Selection;

/// Root configuration for the hub daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Endpoint receiving ordinary client requests.
    pub forwarding: EndpointConfig,

    /// Endpoint receiving REGISTER messages from registrants.
    pub registration: EndpointConfig,

    /// Standby registry settings.
    pub registry: RegistryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            forwarding: EndpointConfig::forwarding(),
            registration: EndpointConfig::registration(),
            registry: RegistryConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// One listening endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// `tcp` or `unix`.
    #[serde(default)]
    pub network: Network,

    /// Bind address (e.g., "0.0.0.0:8080" or a socket path).
    pub bind_address: String,
}

impl EndpointConfig {
    pub fn forwarding() -> Self {
        Self {
            network: Network::Tcp,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }

    pub fn registration() -> Self {
        Self {
            network: Network::Tcp,
            bind_address: "127.0.0.1:8090".to_string(),
        }
    }
}

/// Standby registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// How standby connections are chosen (`fifo` or `pattern`).
    pub selection: Selection,
}

/// Timeout configuration for the hub.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout on the registration endpoint in seconds.
    pub registration_secs: u64,

    /// How long a client may take to send its request head, in seconds.
    /// A bridged session never times out.
    pub request_head_secs: u64,

    /// How long shutdown lets in-flight requests finish, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            registration_secs: 10,
            request_head_secs: 30,
            drain_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "rendezvous_proxy=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Configuration for a registrant's outbound listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrantConfig {
    /// Network used to reach the hub.
    pub network: Network,

    /// Address of the hub's registration endpoint.
    pub hub_address: String,

    /// Registration URL announced to the hub.
    pub registration: String,

    /// Maximum registered but unconsumed connections. 0 means the default.
    pub pool_size: usize,

    /// Redial backoff after a failed registration.
    pub backoff: BackoffConfig,
}

/// Pool size used when none (or zero) is configured.
pub const DEFAULT_POOL_SIZE: usize = 5;

impl RegistrantConfig {
    /// Configured pool size with 0 mapped to [`DEFAULT_POOL_SIZE`].
    pub fn effective_pool_size(&self) -> usize {
        if self.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.pool_size
        }
    }
}

impl Default for RegistrantConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            hub_address: "127.0.0.1:8090".to_string(),
            registration: "http://localhost/".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

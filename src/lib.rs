//! Rendezvous proxy library.
//!
//! Services behind NAT or firewalls dial *out* to a hub and register the
//! host/path pattern they serve. The hub keeps those registered connections
//! on standby and forwards each incoming client request over one of them.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{HubConfig, RegistrantConfig};
pub use http::{serve, HubServer};
pub use lifecycle::Shutdown;
pub use net::{dial, Listener, ListenerError};
pub use protocol::Registration;
pub use registry::Registry;

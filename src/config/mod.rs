//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or CLI flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HubConfig / RegistrantConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_hub_config, load_registrant_config, ConfigError};
pub use schema::{
    BackoffConfig, EndpointConfig, HubConfig, ObservabilityConfig, RegistrantConfig, RegistryConfig,
    TimeoutConfig, DEFAULT_POOL_SIZE,
};
pub use validation::{validate_hub_config, validate_registrant_config, ValidationError};

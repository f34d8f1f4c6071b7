//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::schema::{HubConfig, RegistrantConfig};
use crate::config::validation::{validate_hub_config, validate_registrant_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate a hub configuration from a TOML file.
pub fn load_hub_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let config: HubConfig = read_toml(path)?;
    validate_hub_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate a registrant configuration from a TOML file.
pub fn load_registrant_config(path: &Path) -> Result<RegistrantConfig, ConfigError> {
    let config: RegistrantConfig = read_toml(path)?;
    validate_registrant_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

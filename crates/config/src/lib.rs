//! Configuration management for the call agent
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`CALL_AGENT__` prefix, plus the plain
//!   `PORT`, `BACKEND_URL`, `BACKEND_API_KEY`, `GOOGLE_API_KEY`, `LOG_LEVEL`)
//!
//! Agent profiles are resolved per call through [`HttpConfigResolver`].

pub mod resolver;
pub mod settings;

pub use resolver::HttpConfigResolver;
pub use settings::{
    load_settings, BackendConfig, LlmSettings, ObservabilityConfig, RuntimeEnvironment,
    ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ConfigError {
    /// Settings were read but rejected; never papered over with defaults
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConfigError::MissingField(_) | ConfigError::InvalidValue { .. }
        )
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

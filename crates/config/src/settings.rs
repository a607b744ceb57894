//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use call_agent_core::TurnDefaults;

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - missing credentials are warnings
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// HTTP / WebSocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Configuration backend serving agent profiles
    #[serde(default)]
    pub backend: BackendConfig,

    /// Conversational model
    #[serde(default)]
    pub llm: LlmSettings,

    /// Turn engine defaults and utterances
    #[serde(default)]
    pub turn: TurnDefaults,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port (`PORT`)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the call-control WebSocket
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// WebSocket subprotocol offered to the telephony platform
    #[serde(default = "default_ws_subprotocol")]
    pub ws_subprotocol: String,

    /// Maximum concurrent calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_ws_path() -> String {
    "/callControl".to_string()
}

fn default_ws_subprotocol() -> String {
    "ws.jambonz.org".to_string()
}

fn default_max_calls() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            ws_subprotocol: default_ws_subprotocol(),
            max_calls: default_max_calls(),
        }
    }
}

/// Configuration backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL (`BACKEND_URL`)
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Bearer credential (`BACKEND_API_KEY`)
    #[serde(default = "default_backend_api_key")]
    pub api_key: Option<String>,

    /// Profile lookup timeout; gates call admission so it stays short
    #[serde(default = "default_config_timeout_ms")]
    pub config_timeout_ms: u64,
}

fn default_backend_url() -> String {
    std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn default_backend_api_key() -> Option<String> {
    std::env::var("BACKEND_API_KEY").ok().filter(|k| !k.is_empty())
}

fn default_config_timeout_ms() -> u64 {
    2000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            api_key: default_backend_api_key(),
            config_timeout_ms: default_config_timeout_ms(),
        }
    }
}

/// Conversational model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// API credential (`GOOGLE_API_KEY`)
    #[serde(default = "default_llm_api_key")]
    pub api_key: String,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Per-request timeout
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff (doubles each retry)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_api_key() -> String {
    std::env::var("GOOGLE_API_KEY").unwrap_or_default()
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_llm_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    1
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: default_llm_api_key(),
            endpoint: default_llm_endpoint(),
            timeout_ms: default_llm_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (`LOG_LEVEL`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_backend()?;
        self.validate_llm()?;
        self.validate_turn()?;
        Ok(())
    }

    /// Problems tolerated outside strict environments
    ///
    /// Returned rather than logged so the binary can report them once
    /// tracing is up.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.backend.api_key.is_none() {
            warnings.push("backend.api_key not set, config requests are unauthenticated");
        }
        if self.llm.api_key.is_empty() {
            warnings.push("llm.api_key not set, every call will end with an apology");
        }
        warnings
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: format!("Must start with '/', got {}", self.server.ws_path),
            });
        }

        if self.server.max_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_calls".to_string(),
                message: "Must allow at least one call".to_string(),
            });
        }

        Ok(())
    }

    fn validate_backend(&self) -> Result<(), ConfigError> {
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "backend.url".to_string(),
                message: format!("Must be an http(s) URL, got {}", self.backend.url),
            });
        }

        if self.backend.config_timeout_ms == 0 || self.backend.config_timeout_ms > 10_000 {
            return Err(ConfigError::InvalidValue {
                field: "backend.config_timeout_ms".to_string(),
                message: format!(
                    "Must be between 1 and 10000, got {}",
                    self.backend.config_timeout_ms
                ),
            });
        }

        if self.backend.api_key.is_none() {
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("backend.api_key".to_string()));
            }
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        if self.llm.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_ms".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if self.llm.api_key.is_empty() {
            if self.environment.is_production() {
                return Err(ConfigError::MissingField("llm.api_key".to_string()));
            }
        }

        Ok(())
    }

    fn validate_turn(&self) -> Result<(), ConfigError> {
        if self.turn.gather_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.gather_timeout_secs".to_string(),
                message: "Must be greater than zero".to_string(),
            });
        }

        if !self.turn.action_hook.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "turn.action_hook".to_string(),
                message: format!("Must start with '/', got {}", self.turn.action_hook),
            });
        }

        if self.turn.answer_pause_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.answer_pause_secs".to_string(),
                message: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority: `CALL_AGENT__*` env vars > config/{env} > config/default > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALL_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

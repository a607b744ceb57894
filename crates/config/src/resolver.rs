//! Agent profile resolution over HTTP
//!
//! `POST {backend}/jambonz/config` with `{"number": "..."}` and a bearer
//! credential. The backend answers with the agent profile, or `null` when
//! no agent is configured for the number.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use call_agent_core::{AgentProfile, ConfigResolutionError, ConfigResolver};

use crate::settings::BackendConfig;
use crate::ConfigError;

#[derive(Serialize)]
struct ConfigRequest<'a> {
    number: &'a str,
}

/// Resolves agent profiles from the configuration backend
pub struct HttpConfigResolver {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpConfigResolver {
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.config_timeout_ms))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/jambonz/config", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn map_request_error(err: reqwest::Error) -> ConfigResolutionError {
    if err.is_timeout() {
        ConfigResolutionError::Timeout
    } else {
        ConfigResolutionError::Network(err.to_string())
    }
}

#[async_trait]
impl ConfigResolver for HttpConfigResolver {
    async fn resolve(&self, number: &str) -> Result<AgentProfile, ConfigResolutionError> {
        tracing::debug!(number, endpoint = %self.endpoint, "Fetching agent config");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&ConfigRequest { number });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ConfigResolutionError::NotFound(number.to_string()));
        }
        if !status.is_success() {
            return Err(ConfigResolutionError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_request_error)?;

        let profile: Option<AgentProfile> = serde_json::from_slice(&body)
            .map_err(|e| ConfigResolutionError::InvalidResponse(e.to_string()))?;

        profile.ok_or_else(|| ConfigResolutionError::NotFound(number.to_string()))
    }
}

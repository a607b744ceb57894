//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use call_agent_agent::{SessionRegistry, SessionStart};
use call_agent_config::Settings;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings, fixed at startup
    pub config: Arc<Settings>,
    /// Live call connections
    pub registry: Arc<SessionRegistry>,
    /// Prometheus render handle; `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create application state; `starter` takes over each announced call
    pub fn new(config: Settings, starter: Arc<dyn SessionStart>) -> Self {
        let registry = Arc::new(SessionRegistry::new(starter, config.server.max_calls));
        Self {
            config: Arc::new(config),
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn active_calls(&self) -> usize {
        self.registry.active_calls()
    }

    pub fn at_capacity(&self) -> bool {
        self.registry.is_full()
    }
}

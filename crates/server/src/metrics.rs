//! Prometheus metrics
//!
//! Counters and histograms are recorded through the `metrics` facade across
//! the workspace; this module installs the exporter and serves `/metrics`.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use ::metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use crate::ServerError;

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "call_agent_connections_total",
        "Call-control connections accepted"
    );
    describe_counter!(
        "call_agent_connections_rejected_total",
        "Call-control connections refused at capacity"
    );
    describe_counter!(
        "call_agent_calls_started_total",
        "Calls announced, by direction"
    );
    describe_counter!("call_agent_calls_ended_total", "Announced calls released");
    describe_counter!(
        "call_agent_hook_events_total",
        "Hook events, by routing result"
    );
    describe_counter!(
        "call_agent_decode_errors_total",
        "Inbound messages dropped as malformed"
    );
    describe_counter!(
        "call_agent_handler_errors_total",
        "Hook handlers that failed and ended the call"
    );
    describe_counter!(
        "call_agent_config_failures_total",
        "Calls rejected for lack of agent configuration"
    );
    describe_counter!(
        "call_agent_backend_failures_total",
        "Conversational backend failures, by operation"
    );
    describe_counter!(
        "call_agent_verbs_sent_total",
        "Verbs sent to the telephony platform, by flush kind"
    );
    describe_counter!(
        "call_agent_batches_discarded_total",
        "Batches dropped because the call had already ended"
    );
    describe_histogram!(
        "call_agent_backend_latency_seconds",
        Unit::Seconds,
        "Conversational backend round-trip time"
    );
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics disabled".to_string(),
        ),
    }
}

//! Call Agent Server
//!
//! Provides the call-control WebSocket and the HTTP health, readiness and
//! metrics endpoints.

pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
pub use websocket::CallControlHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Call capacity reached")]
    AtCapacity,

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AtCapacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Metrics(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

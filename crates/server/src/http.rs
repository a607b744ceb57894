//! HTTP Endpoints
//!
//! Liveness, readiness and metrics next to the call-control WebSocket.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::CallControlHandler;

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    active_calls: usize,
    max_calls: usize,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(&ws_path, get(CallControlHandler::handle))
        .layer(TraceLayer::new_for_http())
        // Only bounds the upgrade handshake; the socket itself lives on
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// Liveness only
async fn health_check() -> &'static str {
    "OK"
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let active_calls = state.active_calls();
    let status = if state.at_capacity() {
        "at_capacity"
    } else {
        "ok"
    };

    (
        StatusCode::OK,
        Json(ReadyResponse {
            status,
            active_calls,
            max_calls: state.registry.max_calls(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use call_agent_agent::{CallLink, CallSession, SessionStart};
    use call_agent_config::Settings;

    struct NoopStarter;

    #[async_trait]
    impl SessionStart for NoopStarter {
        async fn on_session_start(&self, _session: &mut CallSession) {}
    }

    fn state(max_calls: usize) -> AppState {
        let mut settings = Settings::default();
        settings.server.max_calls = max_calls;
        AppState::new(settings, Arc::new(NoopStarter))
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = create_router(state(10))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "OK");
    }

    #[tokio::test]
    async fn test_ready_reports_active_calls() {
        let state = state(10);
        let (link, _rx) = CallLink::channel();
        let _conn = state.registry.on_connect(link).unwrap();

        let resp = create_router(state)
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_calls"], 1);
        assert_eq!(json["max_calls"], 10);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let resp = create_router(state(10))
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let resp = create_router(state(10))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_call_control_requires_upgrade() {
        let resp = create_router(state(10))
            .oneshot(Request::get("/callControl").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_call_control_at_capacity() {
        let state = state(1);
        let (link, _rx) = CallLink::channel();
        let _conn = state.registry.on_connect(link).unwrap();

        let resp = create_router(state)
            .oneshot(Request::get("/callControl").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp_ready = body_text(resp).await;
        assert!(resp_ready.is_empty());
    }

    #[tokio::test]
    async fn test_custom_ws_path() {
        let mut settings = Settings::default();
        settings.server.ws_path = "/jambonz".to_string();
        let router = create_router(AppState::new(settings, Arc::new(NoopStarter)));

        let resp = router
            .oneshot(Request::get("/callControl").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

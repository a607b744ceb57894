//! Call Agent Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_agent_agent::TurnEngine;
use call_agent_config::{load_settings, HttpConfigResolver, Settings};
use call_agent_llm::{GeminiBackend, GeminiConfig};
use call_agent_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Plain variables (PORT, BACKEND_URL, ...) may come from a .env file
    let dotenv = dotenvy::dotenv().ok();

    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("CALL_AGENT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!(
                "Loaded configuration (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        // Rejected settings must not boot with development defaults
        Err(e) if e.is_validation() => return Err(e).context("invalid configuration"),
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            let settings = Settings::default();
            settings
                .validate()
                .context("invalid default configuration")?;
            settings
        }
    };

    init_tracing(&config);
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    tracing::info!("Starting Call Agent Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        dotenv = ?dotenv,
        backend_url = %config.backend.url,
        max_calls = config.server.max_calls,
        "Configuration loaded"
    );

    let resolver = Arc::new(
        HttpConfigResolver::new(&config.backend).context("building config resolver")?,
    );
    let backend = Arc::new(
        GeminiBackend::new(GeminiConfig::from(&config.llm)).context("building Gemini backend")?,
    );
    let engine = TurnEngine::new(resolver, backend, config.turn.clone());

    let metrics_enabled = config.observability.metrics_enabled;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    let ws_path = config.server.ws_path.clone();

    let mut state = AppState::new(config, Arc::new(engine));
    if metrics_enabled {
        let handle = init_metrics().context("installing Prometheus recorder")?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
        state = state.with_metrics(handle);
    }

    let app = create_router(state);

    tracing::info!(%addr, ws_path = %ws_path, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing; `RUST_LOG` overrides the configured level
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("call_agent={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

//! SignStation signing proxy
//!
//! Single-binary service sitting on the same origin as the browser app:
//! 1. Enforces an origin allow-list on the signing endpoints
//! 2. Injects server-held SignStation credentials (client id/secret,
//!    department and certificate ids)
//! 3. Forwards `auth`, `sign` and `download` calls to SignStation
//! 4. Exposes `/health` and Prometheus `/metrics`

mod config;
mod cors;
mod error;
mod metrics;
mod proxy;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::cors::OriginPolicy;
use crate::proxy::ProxyState;

/// Time allowed for in-flight requests after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    origins: Arc<OriginPolicy>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl FromRef<AppState> for ProxyState {
    fn from_ref(state: &AppState) -> Self {
        state.proxy.clone()
    }
}

/// Build the router: health and metrics are open, the signing endpoints sit
/// behind the origin policy. A concurrency limit caps in-flight requests at
/// `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let signing = Router::new()
        .route("/auth", any(proxy::auth))
        .route("/sign", any(proxy::sign))
        .route("/download", any(proxy::download))
        .layer(middleware::from_fn_with_state(
            state.origins.clone(),
            cors::enforce,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(signing)
        .layer(DefaultBodyLimit::max(proxy::MAX_BODY_BYTES))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by LOG_LEVEL or RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting signstation-proxy");

    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let credentials = &config.credentials;
    info!(
        listen_addr = %config.proxy.listen_addr,
        upstream_url = %config.proxy.upstream_url,
        allowed_origins = config.cors.allowed_origins.len(),
        client_credentials = credentials.has_client_credentials(),
        signing_identity = credentials.has_signing_identity(),
        "configuration loaded"
    );
    if !credentials.has_client_credentials() {
        warn!("SIGNSTATION_CLIENT_ID/SIGNSTATION_CLIENT_SECRET not set, /auth will answer 500");
    }
    if !credentials.has_signing_identity() {
        warn!("SIGNSTATION_DEPARTMENT_ID/SIGNSTATION_CERTIFICATE_ID not set, /sign will answer 500");
    }
    if config.cors.allowed_origins.is_empty() {
        warn!("cors.allowed_origins is empty, every signing request will be refused");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.proxy.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let in_flight = Arc::new(AtomicU64::new(0));
    let state = AppState {
        proxy: ProxyState {
            client,
            upstream_url: config.proxy.upstream_url.clone(),
            credentials: Arc::new(config.credentials),
            requests_total: Arc::new(AtomicU64::new(0)),
            in_flight: in_flight.clone(),
        },
        origins: Arc::new(OriginPolicy::new(&config.cors.allowed_origins)),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(state, config.proxy.max_connections);

    let listen_addr = config.proxy.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => {
            warn!(
                remaining = in_flight.load(Ordering::Relaxed),
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// 200 when every credential is configured, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let credentials = &state.proxy.credentials;
    let configured = credentials.has_client_credentials() && credentials.has_signing_identity();
    let (status_code, status) = if configured {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = serde_json::json!({
        "status": status,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "requests_served": state.proxy.requests_total.load(Ordering::Relaxed),
        "in_flight": state.proxy.in_flight.load(Ordering::Relaxed),
        "credentials_configured": configured,
    });

    (
        status_code,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

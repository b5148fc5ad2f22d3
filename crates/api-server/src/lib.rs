//! HTTP API for on-demand superstock scans.
//!
//! Scans use the interactive preset, optionally adjusted per request, and
//! share one cached universe across requests.

pub mod screener_routes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use market_data::{default_sources, YahooFinanceClient};
use screener::UniverseCache;
use screener_core::{HistoryProvider, ListingSource, ScreenConfig, ScreenOverrides};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use screener_routes::screener_routes;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_UNIVERSE_TTL_SECS: u64 = 3600;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn HistoryProvider>,
    pub sources: Arc<Vec<Arc<dyn ListingSource>>>,
    pub universe_cache: Arc<UniverseCache>,
    /// Interactive preset with `SCREEN_*` overrides already applied.
    pub base_config: Arc<ScreenConfig>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        sources: Vec<Arc<dyn ListingSource>>,
        universe_ttl: Duration,
        base_config: ScreenConfig,
    ) -> Self {
        Self {
            provider,
            sources: Arc::new(sources),
            universe_cache: Arc::new(UniverseCache::new(universe_ttl)),
            base_config: Arc::new(base_config),
        }
    }
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error carrying the HTTP status to answer with.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    pub fn bad_request(error: impl Into<anyhow::Error>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, error)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(error: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected: {:#}", self.error);
        }
        (self.status, Json(ApiResponse::<()>::error(format!("{:#}", self.error)))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "superstock-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(screener_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("api_server=info,screener=info,tower_http=info")
    });

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

pub async fn run_server() -> anyhow::Result<()> {
    use anyhow::Context;

    dotenvy::dotenv().ok();
    init_tracing();

    let bind_addr: SocketAddr = std::env::var("API_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .context("API_BIND_ADDR must be a socket address")?;
    let universe_ttl = std::env::var("UNIVERSE_CACHE_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_UNIVERSE_TTL_SECS);

    let base_config = ScreenOverrides::from_env()
        .context("Invalid SCREEN_* environment variable")?
        .apply(ScreenConfig::interactive());
    base_config.validate().context("Invalid screen configuration")?;

    let state = AppState::new(
        Arc::new(YahooFinanceClient::from_env()),
        default_sources(),
        Duration::from_secs(universe_ttl),
        base_config,
    );

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Superstock API listening on {}", bind_addr);
    tracing::info!("  Universe cache TTL: {}s", universe_ttl);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

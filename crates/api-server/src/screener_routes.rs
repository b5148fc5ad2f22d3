//! Screener API Routes
//!
//! On-demand scans plus inspection and invalidation of the cached universe.

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use screener::{sanitize_symbols, ScreenPipeline, Universe};
use screener_core::{ScanReport, ScreenOverrides};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiResponse, AppError, AppState};

/// Body of `POST /api/scan`. Every field is optional; unset parameters keep
/// the server's interactive preset.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(flatten)]
    pub overrides: ScreenOverrides,
    /// Scan only these symbols instead of the cached universe.
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UniverseResponse {
    pub size: usize,
    pub tickers: Vec<String>,
    pub cache_age_secs: Option<u64>,
    pub cache_ttl_secs: u64,
}

pub fn screener_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan", post(run_scan))
        .route("/api/universe", get(get_universe))
        .route("/api/universe/cache", delete(invalidate_universe))
}

async fn run_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ApiResponse<ScanReport>>, AppError> {
    let config = request.overrides.apply((*state.base_config).clone());
    let pipeline = ScreenPipeline::new(Arc::clone(&state.provider), config)
        .map_err(AppError::bad_request)?;

    let universe: Arc<Universe> = if request.symbols.is_empty() {
        state.universe_cache.get_or_build(&state.sources).await
    } else {
        let universe = sanitize_symbols(&request.symbols);
        if universe.is_empty() {
            return Err(AppError::bad_request(anyhow::anyhow!(
                "None of the requested symbols is a valid ticker"
            )));
        }
        Arc::new(universe)
    };

    tracing::info!("Interactive scan over {} tickers", universe.len());
    let report = pipeline.run(&universe).await;

    Ok(Json(ApiResponse::success(report)))
}

async fn get_universe(State(state): State<AppState>) -> Json<ApiResponse<UniverseResponse>> {
    let universe = state.universe_cache.get_or_build(&state.sources).await;
    let cache_age_secs = state.universe_cache.age().await.map(|age| age.as_secs());

    Json(ApiResponse::success(UniverseResponse {
        size: universe.len(),
        tickers: universe.iter().map(|t| t.to_string()).collect(),
        cache_age_secs,
        cache_ttl_secs: state.universe_cache.ttl().as_secs(),
    }))
}

async fn invalidate_universe(State(state): State<AppState>) -> Json<ApiResponse<String>> {
    state.universe_cache.invalidate().await;
    Json(ApiResponse::success("Universe cache invalidated".to_string()))
}

// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. Every other endpoint requires a valid Bearer token checked
// via the `AuthBearer` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::types::{AccountMode, TradingMode};

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Operator surface (authenticated) ───────────────────────
        .route("/api/v1/configure", post(configure))
        .route("/api/v1/start", post(start))
        .route("/api/v1/stop", post(stop))
        .route("/api/v1/status", get(status))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/recommendations", get(recommendations))
        // ── Control & config (authenticated) ────────────────────────
        .route("/api/v1/control/pause", post(control_pause))
        .route("/api/v1/control/resume", post(control_resume))
        .route("/api/v1/control/kill", post(control_kill))
        .route("/api/v1/control/account-mode", post(control_account_mode))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok", server_time: chrono::Utc::now().timestamp_millis() })
}

// =============================================================================
// Configure
// =============================================================================

#[derive(Deserialize)]
struct ConfigureRequest {
    symbol: String,
    stake: f64,
    duration: u32,
    #[serde(default)]
    target_trades: u32,
    /// Signal producer to run for this session: "primary" (default), "ldp",
    /// "accumulator", or "terminal".
    #[serde(default)]
    strategy: Option<String>,
}

async fn configure(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigureRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let strategy_kind = req.strategy.as_deref().map(crate::aux_strategies::StrategyKind::parse);
    state
        .configure_session(req.symbol, req.stake, req.duration, req.target_trades, strategy_kind)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() }))))?;
    Ok(Json(serde_json::json!({ "status": "configured" })))
}

// =============================================================================
// Start / Stop
// =============================================================================

async fn start(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    state
        .trade_manager
        .start(state.regime_detector.clone())
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() }))))?;
    Ok(Json(state.build_status()))
}

#[derive(Deserialize)]
struct StopRequest {
    #[serde(default = "default_stop_reason")]
    reason: String,
}

fn default_stop_reason() -> String {
    "operator_requested".to_string()
}

async fn stop(_auth: AuthBearer, State(state): State<Arc<AppState>>, Json(req): Json<StopRequest>) -> impl IntoResponse {
    state.trade_manager.stop(&req.reason);
    Json(state.build_status())
}

// =============================================================================
// Status / Snapshot / Recommendations
// =============================================================================

async fn status(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_status())
}

async fn snapshot(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.event_bus.snapshot())
}

#[derive(Deserialize)]
struct RecommendationsQuery {
    #[serde(default = "default_top_n")]
    top_n: usize,
}

fn default_top_n() -> usize {
    5
}

async fn recommendations(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationsQuery>,
) -> impl IntoResponse {
    let snapshot = state.build_scanner_snapshot(query.top_n);
    let payload = serde_json::json!({
        "status": {
            "running": snapshot.status.running,
            "symbol_count": snapshot.status.symbol_count,
            "last_scan_ms": snapshot.status.last_scan_ms,
        },
        "recommendations": snapshot.recommendations.iter().map(|r| serde_json::json!({
            "symbol": r.symbol,
            "direction": r.direction.to_string(),
            "confidence": r.confidence,
            "confluence_score": r.confluence_score,
            "adx": r.adx,
            "rank_score": r.rank_score,
        })).collect::<Vec<_>>(),
    });
    Json(payload)
}

// =============================================================================
// Control endpoints (authenticated)
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    trading_mode: String,
    message: String,
}

async fn control_pause(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Paused;
    }
    info!("trading paused via API");
    Json(ControlResponse { trading_mode: "Paused".to_string(), message: "trading paused".to_string() })
}

async fn control_resume(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Live;
    }
    info!("trading resumed via API");
    Json(ControlResponse { trading_mode: "Live".to_string(), message: "trading resumed".to_string() })
}

async fn control_kill(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Killed;
    }
    state.trade_manager.stop("killed_via_api");
    warn!("trading killed via API");
    Json(ControlResponse {
        trading_mode: "Killed".to_string(),
        message: "trading killed — manual restart required".to_string(),
    })
}

#[derive(Deserialize)]
struct AccountModeRequest {
    account_mode: String,
    #[serde(default)]
    confirm_real: bool,
}

#[derive(Serialize)]
struct AccountModeResponse {
    account_mode: String,
}

async fn control_account_mode(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountModeRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let mode = match req.account_mode.to_lowercase().as_str() {
        "demo" => AccountMode::Demo,
        "real" => {
            if !req.confirm_real {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "switching to Real mode requires confirm_real: true" })),
                ));
            }
            warn!("switching to REAL account mode via API");
            AccountMode::Real
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("invalid account mode '{}'. use 'demo' or 'real'.", req.account_mode)
                })),
            ));
        }
    };

    {
        let mut config = state.runtime_config.write();
        config.account_mode = mode;
    }
    info!(account_mode = %mode, "account mode changed via API");

    Ok(Json(AccountModeResponse { account_mode: mode.to_string() }))
}

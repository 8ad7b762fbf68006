// =============================================================================
// Quantis Deriv Engine — Main Entry Point
// =============================================================================
//
// The engine starts in Demo + Paused mode for safety. Operators must
// explicitly Configure and Start a session via the REST/WebSocket API.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod aux_strategies;
mod constants;
mod entry_filter;
mod error;
mod event_bus;
mod indicators;
mod journal;
mod pair_scanner;
mod regime;
mod runtime_config;
mod strategy;
mod symbols;
mod tick_buffer;
mod token_store;
mod trade_manager;
mod transport;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::token_store::TokenStore;
use crate::types::{AccountMode, TradingMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Quantis Deriv Engine — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let data_dir = std::env::var("QUANTIS_DATA_DIR").unwrap_or_else(|_| ".".to_string());
    let data_dir = std::path::PathBuf::from(data_dir);
    std::fs::create_dir_all(&data_dir).ok();

    let mut config = RuntimeConfig::load(data_dir.join("runtime_config.json")).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // SAFETY: Force Demo + Paused on startup regardless of the saved config.
    config.trading_mode = TradingMode::Paused;
    config.account_mode = AccountMode::Demo;

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("QUANTIS_SYMBOLS") {
        config.symbols =
            syms.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect();
    }

    info!(symbols = ?config.symbols, "Configured trading symbols");
    info!(
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        "Engine starting in SAFE mode (Demo + Paused)"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state: Arc<AppState> = AppState::new(config, &data_dir);

    // ── 3. Resolve the Deriv API token ───────────────────────────────────
    let account_id = std::env::var("DERIV_ACCOUNT_ID").unwrap_or_else(|_| "default".to_string());
    let token = resolve_api_token(&data_dir, &account_id)?;
    let fallback_token = std::env::var("DERIV_API_TOKEN_FALLBACK").ok();
    if fallback_token.is_some() {
        info!("fallback deriv API token configured, will be used if the primary is rejected");
    }

    // ── 4. Drive the transport connection forever ────────────────────────
    {
        let transport = state.transport.clone();
        tokio::spawn(async move {
            transport.run_forever(token, fallback_token).await;
        });
    }

    // ── 5. Start the pair scanner ─────────────────────────────────────────
    {
        let scanner = state.pair_scanner.clone();
        tokio::spawn(async move {
            if let Err(e) = scanner.start().await {
                error!(error = %e, "pair scanner failed to start");
            }
        });
    }

    // ── 6. Start the API server ──────────────────────────────────────────
    let bind_addr = std::env::var("QUANTIS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    {
        let api_state = state.clone();
        let bind_addr = bind_addr.clone();
        tokio::spawn(async move {
            let app = api::rest::router(api_state);
            let listener = tokio::net::TcpListener::bind(&bind_addr)
                .await
                .expect("failed to bind API server");
            info!(addr = %bind_addr, "API server listening");
            axum::serve(listener, app).await.expect("API server failed");
        });
    }

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    state.trade_manager.stop("shutdown");
    if let Err(e) = state.runtime_config.read().save(data_dir.join("runtime_config.json")) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Quantis Deriv Engine shut down complete.");
    Ok(())
}

/// Resolve the Deriv API token for `account_id`: prefer the encrypted token
/// store, falling back to (and seeding the store from) the `DERIV_API_TOKEN`
/// environment variable on first run.
fn resolve_api_token(data_dir: &std::path::Path, account_id: &str) -> anyhow::Result<String> {
    let secret = std::env::var("QUANTIS_TOKEN_STORE_SECRET")
        .unwrap_or_else(|_| "quantis-deriv-engine-dev-secret".to_string());
    let store = TokenStore::new(data_dir.join("tokens.json"), &secret);

    if let Some(token) = store.retrieve(account_id)? {
        info!(account_id, "loaded Deriv API token from encrypted store");
        return Ok(token);
    }

    let token = std::env::var("DERIV_API_TOKEN")
        .map_err(|_| anyhow::anyhow!("no stored token for '{account_id}' and DERIV_API_TOKEN is not set"))?;
    store.store(account_id, &token)?;
    info!(account_id, "seeded encrypted token store from DERIV_API_TOKEN");
    Ok(token)
}

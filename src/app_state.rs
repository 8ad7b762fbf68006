// =============================================================================
// Central Application State — Quantis Deriv Engine
// =============================================================================
//
// The single source of truth tying together every subsystem: the transport,
// the event bus, the pair scanner, and the trade manager. AppState is built
// once at startup and shared via `Arc<AppState>` across the API server and
// the background tasks that drive the engine.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::aux_strategies::StrategyKind;
use crate::entry_filter::{EntryFilter, RiskMode};
use crate::event_bus::EventBus;
use crate::journal::Journal;
use crate::pair_scanner::{PairScanner, ScannerSnapshot};
use crate::regime::RegimeDetector;
use crate::runtime_config::RuntimeConfig;
use crate::trade_manager::{SessionConfig, SessionStats, TradeManager};
use crate::transport::DerivTransport;
use crate::types::TradeManagerState;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub runtime_config: RwLock<RuntimeConfig>,
    pub transport: Arc<DerivTransport>,
    pub event_bus: Arc<EventBus>,
    pub regime_detector: Arc<RegimeDetector>,
    pub entry_filter: Arc<EntryFilter>,
    pub pair_scanner: Arc<PairScanner>,
    pub trade_manager: Arc<TradeManager>,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration and
    /// data directory. Every subsystem is wired but not yet started; callers
    /// drive the transport connection and `trade_manager`/`pair_scanner`
    /// lifecycles explicitly (see `main.rs`).
    pub fn new(config: RuntimeConfig, data_dir: impl Into<PathBuf>) -> Arc<Self> {
        let data_dir = data_dir.into();

        let transport = DerivTransport::new(config.app_id.clone());
        let event_bus = Arc::new(EventBus::new());
        let regime_detector = Arc::new(RegimeDetector::new());
        let entry_filter = Arc::new(EntryFilter::new());

        let pair_scanner =
            Arc::new(PairScanner::new(transport.clone(), regime_detector.clone(), config.symbols.clone()));

        let journal = Arc::new(Journal::new(data_dir.join("trade_journal.csv")));
        let trade_manager = Arc::new(TradeManager::new(
            transport.clone(),
            event_bus.clone(),
            entry_filter.clone(),
            journal,
            config.account_mode,
            config.max_daily_loss_pct,
            data_dir.join("session_recovery.json"),
            config.strategy_params.extreme_volatility_blocks_trading,
        ));

        Arc::new(Self {
            runtime_config: RwLock::new(config),
            transport,
            event_bus,
            regime_detector,
            entry_filter,
            pair_scanner,
            trade_manager,
            start_time: std::time::Instant::now(),
        })
    }

    /// Apply a new trade-manager session configuration derived from the
    /// current `RuntimeConfig`, validating symbol/stake/duration along the
    /// way.
    pub fn configure_session(
        &self,
        symbol: String,
        base_stake: f64,
        duration: u32,
        target_trades: u32,
        strategy_kind: Option<StrategyKind>,
    ) -> Result<(), crate::error::EngineError> {
        let risk_mode = RiskMode::parse(&self.runtime_config.read().risk_mode);
        let strategy_kind = strategy_kind.unwrap_or_default();
        self.trade_manager.configure(SessionConfig { symbol, base_stake, duration, target_trades, risk_mode, strategy_kind })
    }

    pub fn build_status(&self) -> StatusSnapshot {
        let config = self.runtime_config.read();
        StatusSnapshot {
            trade_manager_state: self.trade_manager.state(),
            session_stats: self.trade_manager.stats(),
            trading_mode: config.trading_mode.to_string(),
            account_mode: config.account_mode.to_string(),
            symbols: config.symbols.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn build_scanner_snapshot(&self, top_n: usize) -> ScannerSnapshot {
        self.pair_scanner.get_snapshot(top_n)
    }
}

/// Response payload for the `Status()` operator surface call.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub trade_manager_state: TradeManagerState,
    pub session_stats: SessionStats,
    pub trading_mode: String,
    pub account_mode: String,
    pub symbols: Vec<String>,
    pub uptime_secs: u64,
}

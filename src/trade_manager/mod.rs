// =============================================================================
// Trade Manager — the state machine that turns signals into contracts
// =============================================================================
//
// `IDLE -> RUNNING <-> WAITING_RESULT -> ... -> STOPPED`. Transitions are
// driven by ticks, buy responses, and contract settlements. One instance
// trades exactly one configured symbol; the pair scanner's `Strategy`
// instances are separate and read-only for ranking purposes.

pub mod recovery;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::constants::{
    BUY_RESPONSE_TIMEOUT_SECS, CIRCUIT_BREAKER_FAILURE_THRESHOLD, CIRCUIT_BREAKER_PAUSE_SECS,
    CIRCUIT_BREAKER_WINDOW_SECS, MARTINGALE_MULTIPLIER, MAX_MARTINGALE_LEVEL, MIN_TICKS_FOR_ANALYSIS,
    ROLLING_WIN_RATE_WINDOW, SESSION_SNAPSHOT_EVERY_N_TRADES, TRADE_RESULT_HISTORY_CAP,
};
use crate::aux_strategies::{SignalProducer, StrategyKind};
use crate::entry_filter::{EntryFilter, RiskMode};
use crate::error::EngineError;
use crate::event_bus::{
    BalanceUpdateEvent, Event, EventBus, PositionCloseEvent, PositionOpenEvent, PositionsResetEvent, StatusEvent,
    TradeHistoryEvent,
};
use crate::journal::{Journal, JournalRow};
use crate::regime::RegimeDetector;
use crate::symbols;
use crate::transport::{BuyRequest, DerivTransport};
use crate::types::{AccountMode, Direction, TradeManagerState};

use recovery::SessionRecoveryRecord;

/// A configured but not yet started (or stopped-and-reconfigurable) session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub symbol: String,
    pub base_stake: f64,
    pub duration: u32,
    /// 0 = unlimited.
    pub target_trades: u32,
    pub risk_mode: RiskMode,
    pub strategy_kind: StrategyKind,
}

impl SessionConfig {
    fn validate(&self) -> Result<(), EngineError> {
        let cfg = symbols::lookup(&self.symbol)
            .ok_or_else(|| EngineError::config(format!("unsupported symbol {}", self.symbol)))?;
        if self.base_stake < cfg.min_stake {
            return Err(EngineError::config(format!(
                "stake {} below minimum {} for {}",
                self.base_stake, cfg.min_stake, self.symbol
            )));
        }
        cfg.validate_duration(self.duration).map_err(EngineError::config)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct MartingaleState {
    level: u32,
    current_stake: f64,
    in_sequence: bool,
    cumulative_loss: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SessionStats {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub consecutive_losses: u32,
    pub daily_pnl: f64,
    pub peak_balance: f64,
    pub max_drawdown: f64,
    pub hourly_profit: HashMap<u8, f64>,
    pub rsi_bucket_performance: HashMap<String, (u32, u32)>,
    /// Martingale recovery sequences that ended in a win vs. ones forcibly
    /// ended by hitting `MAX_MARTINGALE_LEVEL`.
    pub martingale_recoveries: u32,
    pub martingale_failures: u32,
    /// Trailing win/loss outcomes, most recent last, capped at
    /// `TRADE_RESULT_HISTORY_CAP`. Backs `rolling_win_rate()`.
    pub trade_results: VecDeque<bool>,
}

impl SessionStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64
        }
    }

    /// Win rate over the trailing `ROLLING_WIN_RATE_WINDOW` trades. Returns
    /// 0.5 with no trade history yet, mirroring a neutral prior rather than
    /// 0.0 dragging the figure down before any trades have closed.
    pub fn rolling_win_rate(&self) -> f64 {
        if self.trade_results.is_empty() {
            return 0.5;
        }
        let recent: Vec<bool> =
            self.trade_results.iter().rev().take(ROLLING_WIN_RATE_WINDOW).copied().collect();
        let wins = recent.iter().filter(|&&w| w).count();
        wins as f64 / recent.len() as f64
    }

    pub fn martingale_success_rate(&self) -> f64 {
        let total = self.martingale_recoveries + self.martingale_failures;
        if total == 0 {
            0.0
        } else {
            self.martingale_recoveries as f64 / total as f64
        }
    }

    fn record_trade_result(&mut self, is_win: bool) {
        self.trade_results.push_back(is_win);
        while self.trade_results.len() > TRADE_RESULT_HISTORY_CAP {
            self.trade_results.pop_front();
        }
    }
}

struct CircuitBreakerState {
    recent_failures: Vec<Instant>,
    paused_until: Option<Instant>,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self { recent_failures: Vec::new(), paused_until: None }
    }

    fn record_failure(&mut self, now: Instant) {
        self.recent_failures.retain(|t| now.duration_since(*t).as_secs() < CIRCUIT_BREAKER_WINDOW_SECS);
        self.recent_failures.push(now);
        if self.recent_failures.len() as u32 > CIRCUIT_BREAKER_FAILURE_THRESHOLD {
            self.paused_until = Some(now + Duration::from_secs(CIRCUIT_BREAKER_PAUSE_SECS));
            warn!("circuit breaker tripped: pausing trading for {CIRCUIT_BREAKER_PAUSE_SECS}s");
        }
    }

    fn is_paused(&self, now: Instant) -> bool {
        self.paused_until.map(|until| now < until).unwrap_or(false)
    }
}

struct PendingTrade {
    contract_id: Option<i64>,
    symbol: String,
    direction: Direction,
    stake: f64,
    martingale_level: u32,
    rsi_bucket: String,
    opened_at: chrono::DateTime<Utc>,
    sent_at: Instant,
}

/// Owns exactly one trading session for one configured symbol.
pub struct TradeManager {
    transport: Arc<DerivTransport>,
    event_bus: Arc<EventBus>,
    entry_filter: Arc<EntryFilter>,
    journal: Arc<Journal>,
    account_mode: AccountMode,
    max_daily_loss_pct: f64,

    strategy: Mutex<Option<Box<dyn SignalProducer + Send>>>,
    config: RwLock<Option<SessionConfig>>,
    state: RwLock<TradeManagerState>,
    martingale: Mutex<MartingaleState>,
    stats: Mutex<SessionStats>,
    circuit_breaker: Mutex<CircuitBreakerState>,
    last_trade_at: Mutex<Option<Instant>>,
    pending: Mutex<Option<PendingTrade>>,
    trade_lock: tokio::sync::Mutex<()>,
    buy_failure_streak: AtomicU32,
    recovery_path: PathBuf,
    blocks_extreme_volatility: AtomicBool,
}

const SAME_SIDE_REENTRY_COOLDOWN_SECS: u64 = 4;
const PROJECTED_RISK_WARN_FRACTION: f64 = 0.20;
const MAX_BUY_RETRIES: u32 = 5;

impl TradeManager {
    pub fn new(
        transport: Arc<DerivTransport>,
        event_bus: Arc<EventBus>,
        entry_filter: Arc<EntryFilter>,
        journal: Arc<Journal>,
        account_mode: AccountMode,
        max_daily_loss_pct: f64,
        recovery_path: impl Into<PathBuf>,
        blocks_extreme_volatility: bool,
    ) -> Self {
        Self {
            transport,
            event_bus,
            entry_filter,
            journal,
            account_mode,
            max_daily_loss_pct,
            strategy: Mutex::new(None),
            config: RwLock::new(None),
            state: RwLock::new(TradeManagerState::Idle),
            martingale: Mutex::new(MartingaleState::default()),
            stats: Mutex::new(SessionStats::default()),
            circuit_breaker: Mutex::new(CircuitBreakerState::new()),
            last_trade_at: Mutex::new(None),
            pending: Mutex::new(None),
            trade_lock: tokio::sync::Mutex::new(()),
            buy_failure_streak: AtomicU32::new(0),
            recovery_path: recovery_path.into(),
            blocks_extreme_volatility: AtomicBool::new(blocks_extreme_volatility),
        }
    }

    pub fn state(&self) -> TradeManagerState {
        *self.state.read()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Mirrors `RuntimeConfig::strategy_params.extreme_volatility_blocks_trading`.
    /// Called whenever the operator surface updates runtime config so the
    /// entry filter's live gate stays in sync without a restart.
    pub fn set_blocks_extreme_volatility(&self, blocks: bool) {
        self.blocks_extreme_volatility.store(blocks, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Configure
    // -------------------------------------------------------------------------

    pub fn configure(&self, cfg: SessionConfig) -> Result<(), EngineError> {
        cfg.validate()?;
        info!(symbol = %cfg.symbol, base_stake = cfg.base_stake, duration = cfg.duration, strategy_kind = cfg.strategy_kind.as_str(), "trade manager configured");
        *self.config.write() = Some(cfg);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Start / Stop
    // -------------------------------------------------------------------------

    pub async fn start(self: &Arc<Self>, regime_detector: Arc<RegimeDetector>) -> Result<(), EngineError> {
        let cfg = self.config.read().clone().ok_or_else(|| EngineError::config("not configured"))?;

        let symbol_cfg = symbols::lookup(&cfg.symbol)
            .ok_or_else(|| EngineError::config(format!("unsupported symbol {}", cfg.symbol)))?;

        let mut strategy = cfg.strategy_kind.build(cfg.symbol.clone(), regime_detector);
        let required = MIN_TICKS_FOR_ANALYSIS as u32 + 20;
        match self.transport.ticks_history(&cfg.symbol, required).await {
            Ok(history) => {
                for (i, price) in history.iter().enumerate() {
                    strategy.add_tick(*price, i as i64);
                }
            }
            Err(e) => warn!(symbol = %cfg.symbol, error = %e, "failed to preload history on start"),
        }
        *self.strategy.lock() = Some(strategy);

        if let Some(record) = SessionRecoveryRecord::load_and_validate(&self.recovery_path, symbol_cfg.min_stake) {
            let mut martingale = self.martingale.lock();
            martingale.level = record.martingale_level;
            martingale.current_stake = record.current_stake;
            martingale.in_sequence = record.martingale_level > 0;

            let mut stats = self.stats.lock();
            stats.total_trades = record.total_trades;
            stats.wins = record.wins;
            stats.losses = record.losses;
            stats.consecutive_losses = record.consecutive_losses;
            stats.daily_pnl = record.daily_pnl;

            info!(symbol = %cfg.symbol, total_trades = record.total_trades, "session resumed from recovery record");
        } else {
            *self.martingale.lock() = MartingaleState { current_stake: cfg.base_stake, ..Default::default() };
            *self.stats.lock() = SessionStats::default();
        }

        *self.circuit_breaker.lock() = CircuitBreakerState::new();
        *self.last_trade_at.lock() = None;
        *self.pending.lock() = None;
        self.buy_failure_streak.store(0, Ordering::SeqCst);

        *self.state.write() = TradeManagerState::Running;
        self.publish_status();
        info!(symbol = %cfg.symbol, strategy_kind = cfg.strategy_kind.as_str(), "trade manager session started");
        Ok(())
    }

    pub fn stop(&self, reason: &str) {
        *self.state.write() = TradeManagerState::Stopped;
        *self.pending.lock() = None;
        self.persist_session_summary();
        SessionRecoveryRecord::clear(&self.recovery_path);
        self.event_bus.publish(Event::PositionsReset(PositionsResetEvent {
            reason: reason.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }));
        self.publish_status();
        info!(reason, "trade manager session stopped");
    }

    fn persist_session_summary(&self) {
        let Some(cfg) = self.config.read().clone() else { return };
        let martingale = self.martingale.lock().clone();
        let stats = self.stats.lock().clone();

        let record = SessionRecoveryRecord {
            symbol: cfg.symbol,
            base_stake: cfg.base_stake,
            current_stake: martingale.current_stake,
            duration: cfg.duration,
            target_trades: cfg.target_trades,
            total_trades: stats.total_trades,
            wins: stats.wins,
            losses: stats.losses,
            martingale_level: martingale.level,
            consecutive_losses: stats.consecutive_losses,
            daily_pnl: stats.daily_pnl,
            saved_at_ms: Utc::now().timestamp_millis(),
        };
        if let Err(e) = record.save(&self.recovery_path) {
            warn!(error = %e, "failed to persist session recovery record");
        }
    }

    fn publish_status(&self) {
        self.event_bus.publish(Event::Status(StatusEvent {
            is_trading: self.state() == TradeManagerState::Running || self.state() == TradeManagerState::WaitingResult,
            is_connected: true,
            account_type: format!("{:?}", self.account_mode).to_lowercase(),
        }));
    }

    // -------------------------------------------------------------------------
    // Per-tick evaluation loop
    // -------------------------------------------------------------------------

    /// Route one incoming tick through the strategy and (when `RUNNING`)
    /// the full evaluate-and-send pipeline. Called by the owning task's
    /// `subscribe_ticks` loop.
    pub async fn on_tick(self: &Arc<Self>, price: f64, timestamp_ms: i64) {
        if let Some(strategy) = self.strategy.lock().as_mut() {
            strategy.add_tick(price, timestamp_ms);
        }

        if self.state() != TradeManagerState::Running {
            return;
        }

        self.evaluate_and_trade().await;
    }

    async fn evaluate_and_trade(self: &Arc<Self>) {
        let now = Instant::now();

        if self.circuit_breaker.lock().is_paused(now) {
            debug!("circuit breaker active, skipping evaluation");
            return;
        }

        if let Some(pending) = self.pending.lock().as_ref() {
            if pending.contract_id.is_none() && now.duration_since(pending.sent_at).as_secs() > BUY_RESPONSE_TIMEOUT_SECS {
                warn!("buy request timed out with no response, resetting to RUNNING");
                self.circuit_breaker.lock().record_failure(now);
                *self.pending.lock() = None;
            } else {
                return;
            }
        }

        if let Some(last) = *self.last_trade_at.lock() {
            if now.duration_since(last).as_secs() < SAME_SIDE_REENTRY_COOLDOWN_SECS {
                return;
            }
        }

        let Ok(_guard) = self.trade_lock.try_lock() else {
            debug!("single-flight guard held, skipping this tick");
            return;
        };

        let Some(signal) = self.strategy.lock().as_mut().map(|s| s.analyze()) else { return };
        if !signal.direction.is_actionable() {
            return;
        }

        let Some(cfg) = self.config.read().clone() else { return };
        let blocks_extreme_volatility = self.blocks_extreme_volatility.load(Ordering::SeqCst);
        let filter_result = self.entry_filter.evaluate(cfg.risk_mode, &signal, true, true, blocks_extreme_volatility);
        if !filter_result.allowed {
            debug!(reasons = ?filter_result.block_reasons, "entry filter blocked signal");
            return;
        }

        if let Err(e) = self.risk_preflight(&cfg).await {
            warn!(error = %e, "risk preflight failed, stopping session");
            self.stop("risk_abort");
            return;
        }

        self.send_buy(cfg, signal.direction).await;
    }

    async fn risk_preflight(&self, cfg: &SessionConfig) -> Result<(), EngineError> {
        let balance = self
            .transport
            .request_balance()
            .await
            .map_err(|e| EngineError::transport(e.to_string()))?
            .balance;

        let symbol_cfg = symbols::lookup(&cfg.symbol)
            .ok_or_else(|| EngineError::config(format!("unsupported symbol {}", cfg.symbol)))?;

        let martingale = self.martingale.lock().clone();
        let stake = if martingale.in_sequence {
            if martingale.current_stake > balance {
                return Err(EngineError::risk_abort(format!(
                    "martingale stake {} exceeds balance {}",
                    martingale.current_stake, balance
                )));
            }
            martingale.current_stake
        } else {
            let stake = cfg.base_stake.max(symbol_cfg.min_stake);
            if balance < stake {
                return Err(EngineError::risk_abort(format!("balance {balance} below stake {stake}")));
            }
            stake
        };

        let r = MARTINGALE_MULTIPLIER;
        let projected = if (r - 1.0).abs() < f64::EPSILON {
            stake * MAX_MARTINGALE_LEVEL as f64
        } else {
            stake * (1.0 - r.powi(MAX_MARTINGALE_LEVEL as i32)) / (1.0 - r)
        };
        if projected > balance * PROJECTED_RISK_WARN_FRACTION {
            warn!(projected, balance, "projected martingale exposure exceeds 20% of balance");
        }

        if self.account_mode == AccountMode::Real {
            let stats = self.stats.lock();
            let loss_pct = if balance > 0.0 { (-stats.daily_pnl).max(0.0) / balance * 100.0 } else { 0.0 };
            if loss_pct >= self.max_daily_loss_pct {
                return Err(EngineError::risk_abort(format!("daily loss {loss_pct:.2}% reached cap")));
            }
        }

        if self.stats.lock().consecutive_losses >= 5 {
            return Err(EngineError::risk_abort("5 consecutive losses reached"));
        }

        Ok(())
    }

    async fn send_buy(self: &Arc<Self>, cfg: SessionConfig, direction: Direction) {
        let martingale = self.martingale.lock().clone();
        let stake = if martingale.in_sequence { martingale.current_stake } else { cfg.base_stake };

        let symbol_cfg = match symbols::lookup(&cfg.symbol) {
            Some(c) => c,
            None => return,
        };

        let rsi_bucket = self
            .strategy
            .lock()
            .as_ref()
            .and_then(|s| s.last_rsi())
            .map(|v| if v >= 70.0 { "OVERBOUGHT" } else if v <= 30.0 { "OVERSOLD" } else { "NEUTRAL" })
            .unwrap_or("UNKNOWN")
            .to_string();

        let request = BuyRequest::new(
            stake,
            direction.as_contract_type(),
            &cfg.symbol,
            cfg.duration,
            symbol_cfg.duration_unit.as_wire_code(),
        );

        *self.state.write() = TradeManagerState::WaitingResult;
        let sent_at = Instant::now();
        *self.pending.lock() = Some(PendingTrade {
            contract_id: None,
            symbol: cfg.symbol.clone(),
            direction,
            stake,
            martingale_level: martingale.level,
            rsi_bucket,
            opened_at: Utc::now(),
            sent_at,
        });

        match self.transport.buy_contract(&request).await {
            Ok(response) => {
                self.buy_failure_streak.store(0, Ordering::SeqCst);
                if let Some(pending) = self.pending.lock().as_mut() {
                    pending.contract_id = Some(response.contract_id);
                }

                self.event_bus.publish(Event::PositionOpen(PositionOpenEvent {
                    contract_id: response.contract_id.to_string(),
                    symbol: cfg.symbol.clone(),
                    entry_price: response.buy_price,
                    stake,
                    direction: direction.to_string(),
                    martingale_level: martingale.level,
                    timestamp: Utc::now().timestamp_millis(),
                }));

                info!(contract_id = response.contract_id, symbol = %cfg.symbol, stake, "contract purchased");
                self.watch_contract(response.contract_id).await;
            }
            Err(e) => {
                warn!(error = %e, "buy request failed");
                self.circuit_breaker.lock().record_failure(Instant::now());
                let streak = self.buy_failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
                *self.pending.lock() = None;
                *self.state.write() = TradeManagerState::Running;

                if streak >= MAX_BUY_RETRIES {
                    error!("buy retries exhausted, stopping session");
                    self.stop("buy_retries_exhausted");
                } else {
                    let backoff = Duration::from_secs(5 * 2u64.pow(streak.min(4)));
                    debug!(streak, backoff_secs = backoff.as_secs(), "backing off before next buy attempt");
                }
            }
        }
    }

    async fn watch_contract(self: &Arc<Self>, contract_id: i64) {
        let mut rx = match self.transport.subscribe_contract(contract_id).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(contract_id, error = %e, "failed to subscribe to contract updates");
                return;
            }
        };

        while let Ok(poc) = rx.recv().await {
            if poc.is_settled() {
                self.on_settlement(poc.profit, poc.is_win(), poc.sell_price).await;
                return;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    async fn on_settlement(self: &Arc<Self>, profit: f64, is_win: bool, exit_price: f64) {
        let Some(pending) = self.pending.lock().take() else { return };
        let closed_at = Utc::now();

        {
            let mut stats = self.stats.lock();
            stats.total_trades += 1;
            stats.daily_pnl += profit;
            if is_win {
                stats.wins += 1;
                stats.consecutive_losses = 0;
            } else {
                stats.losses += 1;
                stats.consecutive_losses += 1;
            }
            stats.record_trade_result(is_win);

            let hour = closed_at.hour() as u8;
            *stats.hourly_profit.entry(hour).or_insert(0.0) += profit;

            let entry = stats.rsi_bucket_performance.entry(pending.rsi_bucket.clone()).or_insert((0, 0));
            if is_win {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }

            if stats.daily_pnl > stats.peak_balance {
                stats.peak_balance = stats.daily_pnl;
            }
            let drawdown = stats.peak_balance - stats.daily_pnl;
            if drawdown > stats.max_drawdown {
                stats.max_drawdown = drawdown;
            }
        }

        self.apply_martingale_rule(is_win, profit);

        self.event_bus.publish(Event::PositionClose(PositionCloseEvent {
            contract_id: pending.contract_id.map(|c| c.to_string()).unwrap_or_default(),
            symbol: pending.symbol.clone(),
            exit_price,
            profit,
            is_win,
            timestamp: closed_at.timestamp_millis(),
        }));
        self.event_bus.publish(Event::TradeHistory(TradeHistoryEvent {
            trade_id: pending.contract_id.map(|c| c.to_string()).unwrap_or_default(),
            symbol: pending.symbol.clone(),
            direction: pending.direction.to_string(),
            stake: pending.stake,
            result: if is_win { "win".to_string() } else { "loss".to_string() },
            profit,
            timestamp: closed_at.timestamp_millis(),
        }));

        if let Err(e) = self.journal.append(&JournalRow {
            trade_id: pending.contract_id.map(|c| c.to_string()).unwrap_or_default(),
            symbol: pending.symbol.clone(),
            direction: pending.direction.to_string(),
            stake: pending.stake,
            martingale_level: pending.martingale_level,
            result: if is_win { "win".to_string() } else { "loss".to_string() },
            profit,
            opened_at: pending.opened_at.to_rfc3339(),
            closed_at: closed_at.to_rfc3339(),
        }) {
            warn!(error = %e, "failed to append trade journal row");
        }

        *self.last_trade_at.lock() = Some(Instant::now());

        let total_trades = self.stats.lock().total_trades;
        if total_trades % SESSION_SNAPSHOT_EVERY_N_TRADES == 0 {
            self.persist_session_summary();
        }

        if *self.state.read() == TradeManagerState::Stopped {
            return;
        }
        *self.state.write() = TradeManagerState::Running;

        if let Some(cfg) = self.config.read().clone() {
            if cfg.target_trades > 0 && total_trades >= cfg.target_trades {
                self.complete_session();
            }
        }
    }

    fn apply_martingale_rule(&self, is_win: bool, profit: f64) {
        let mut martingale = self.martingale.lock();
        let base_stake = self.config.read().as_ref().map(|c| c.base_stake).unwrap_or(martingale.current_stake);

        if is_win {
            if martingale.in_sequence {
                info!(cumulative_loss = martingale.cumulative_loss, "martingale recovery sequence succeeded");
                self.stats.lock().martingale_recoveries += 1;
            }
            martingale.current_stake = base_stake;
            martingale.level = 0;
            martingale.in_sequence = false;
            martingale.cumulative_loss = 0.0;
        } else {
            martingale.cumulative_loss += profit.abs();
            martingale.level += 1;
            if martingale.level >= MAX_MARTINGALE_LEVEL {
                warn!("max martingale level reached, session will stop with no further trades");
                self.stats.lock().martingale_failures += 1;
                drop(martingale);
                self.stop("max_martingale_level");
                return;
            }
            martingale.current_stake = base_stake * MARTINGALE_MULTIPLIER.powi(martingale.level as i32);
            martingale.in_sequence = true;
        }
    }

    fn complete_session(&self) {
        self.event_bus.publish(Event::PositionsReset(PositionsResetEvent {
            reason: "target_trades_reached".to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }));
        *self.state.write() = TradeManagerState::Stopped;
        self.persist_session_summary();
        SessionRecoveryRecord::clear(&self.recovery_path);
        info!("target trade count reached, session complete");
    }

    pub fn publish_balance(&self, balance: f64, currency: &str, account_id: &str) {
        self.event_bus.publish(Event::Balance(BalanceUpdateEvent {
            balance,
            currency: currency.to_string(),
            account_id: account_id.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_rejects_stake_below_minimum() {
        let cfg = SessionConfig {
            symbol: "R_100".to_string(),
            base_stake: 0.10,
            duration: 5,
            target_trades: 0,
            risk_mode: RiskMode::HighProbability,
            strategy_kind: StrategyKind::Primary,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn session_config_rejects_unsupported_duration() {
        let cfg = SessionConfig {
            symbol: "R_100".to_string(),
            base_stake: 1.0,
            duration: 50,
            target_trades: 0,
            risk_mode: RiskMode::HighProbability,
            strategy_kind: StrategyKind::Primary,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn session_config_accepts_valid_parameters() {
        let cfg = SessionConfig {
            symbol: "R_100".to_string(),
            base_stake: 1.0,
            duration: 5,
            target_trades: 0,
            risk_mode: RiskMode::HighProbability,
            strategy_kind: StrategyKind::Primary,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn circuit_breaker_trips_after_threshold_failures() {
        let mut cb = CircuitBreakerState::new();
        let now = Instant::now();
        for _ in 0..(CIRCUIT_BREAKER_FAILURE_THRESHOLD + 1) {
            cb.record_failure(now);
        }
        assert!(cb.is_paused(now));
    }

    #[test]
    fn circuit_breaker_clear_below_threshold() {
        let mut cb = CircuitBreakerState::new();
        let now = Instant::now();
        cb.record_failure(now);
        assert!(!cb.is_paused(now));
    }

    #[test]
    fn session_stats_win_rate_handles_zero_trades() {
        let stats = SessionStats::default();
        assert_eq!(stats.win_rate(), 0.0);
    }

    #[test]
    fn rolling_win_rate_defaults_neutral_with_no_history() {
        let stats = SessionStats::default();
        assert_eq!(stats.rolling_win_rate(), 0.5);
    }

    #[test]
    fn rolling_win_rate_reflects_trailing_window_only() {
        let mut stats = SessionStats::default();
        for _ in 0..30 {
            stats.record_trade_result(false);
        }
        for _ in 0..ROLLING_WIN_RATE_WINDOW {
            stats.record_trade_result(true);
        }
        assert_eq!(stats.rolling_win_rate(), 1.0);
    }

    #[test]
    fn trade_result_history_is_capped() {
        let mut stats = SessionStats::default();
        for _ in 0..(TRADE_RESULT_HISTORY_CAP + 25) {
            stats.record_trade_result(true);
        }
        assert_eq!(stats.trade_results.len(), TRADE_RESULT_HISTORY_CAP);
    }

    #[test]
    fn martingale_recovery_increments_on_win_after_sequence() {
        let cfg = SessionConfig {
            symbol: "R_100".to_string(),
            base_stake: 1.0,
            duration: 5,
            target_trades: 0,
            risk_mode: RiskMode::HighProbability,
            strategy_kind: StrategyKind::Primary,
        };
        let tm = test_trade_manager();
        *tm.config.write() = Some(cfg);
        *tm.martingale.lock() = MartingaleState { level: 2, current_stake: 4.0, in_sequence: true, cumulative_loss: 3.0 };

        tm.apply_martingale_rule(true, 3.0);

        assert_eq!(tm.stats.lock().martingale_recoveries, 1);
        assert_eq!(tm.stats.lock().martingale_failures, 0);
        assert!(!tm.martingale.lock().in_sequence);
    }

    #[test]
    fn martingale_failure_increments_at_max_level() {
        let tm = test_trade_manager();
        *tm.martingale.lock() =
            MartingaleState { level: MAX_MARTINGALE_LEVEL - 1, current_stake: 16.0, in_sequence: true, cumulative_loss: 15.0 };

        tm.apply_martingale_rule(false, 16.0);

        assert_eq!(tm.stats.lock().martingale_failures, 1);
        assert_eq!(tm.stats.lock().martingale_recoveries, 0);
    }

    fn test_trade_manager() -> TradeManager {
        TradeManager::new(
            DerivTransport::new("1089"),
            Arc::new(EventBus::new()),
            Arc::new(EntryFilter::new()),
            Arc::new(Journal::new(std::env::temp_dir().join("test_journal.csv"))),
            AccountMode::Demo,
            10.0,
            std::env::temp_dir().join("test_session_recovery.json"),
            false,
        )
    }
}

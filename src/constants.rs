// =============================================================================
// Named tuning constants
// =============================================================================
//
// Every magic number that governs trading behaviour lives here, not inline at
// its use site. Values that an operator should be able to retune without a
// rebuild are mirrored as `RuntimeConfig` fields (see `config.rs`) whose
// `#[serde(default = ...)]` helper returns the constant below; the constant
// remains the single source of truth for the shipped default.

// ---- Transport (wire protocol, reconnect, health) --------------------------

pub const DERIV_WS_URL_BASE: &str = "wss://ws.derivws.com/websockets/v3";
pub const DEFAULT_APP_ID: &str = "1089";

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_DELAY_SECS: u64 = 5;
pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;

pub const MAX_AUTH_RETRIES: u32 = 3;
pub const AUTH_RETRY_DELAY_SECS: u64 = 2;
pub const MAX_AUTH_RETRY_DELAY_SECS: u64 = 30;
pub const AUTH_TIMEOUT_SECS: u64 = 30;

pub const PENDING_REQUEST_REAP_INTERVAL_SECS: u64 = 30;
pub const PENDING_QUEUE_DEPTH_WARN: usize = 50;

pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 60;
pub const PING_TIMEOUT_SECS: u64 = 120;
pub const MAX_MISSED_PONGS: u32 = 3;
pub const GRACE_PERIOD_SECS: u64 = 10;
pub const PING_JITTER_MAX_SECS: u64 = 15;

pub const PENDING_REQUEST_TIMEOUT_SECS: u64 = 60;

// ---- Event bus --------------------------------------------------------------

pub const EVENT_QUEUE_MAX_SIZE: usize = 1000;
pub const MAX_TRADE_HISTORY: usize = 200;

// ---- Tick buffer --------------------------------------------------------------

pub const TICK_BUFFER_CAPACITY: usize = 500;
pub const MIN_TICKS_FOR_ANALYSIS: usize = 30;

// ---- Regime detection ---------------------------------------------------------

pub const REGIME_ADX_TRENDING_MIN: f64 = 22.0;
pub const REGIME_DI_SPREAD_TRENDING_MIN: f64 = 10.0;
pub const REGIME_ADX_RANGING_MAX: f64 = 12.0;
pub const REGIME_BBW_PERCENTILE_RANGING_MAX: f64 = 25.0;
pub const REGIME_ADX_RANGING_SOFT_MAX: f64 = 18.0;
pub const REGIME_BBW_LOOKBACK: usize = 100;

// ---- Strategy / prediction voting ---------------------------------------------

pub const HORIZONS: [usize; 3] = [1, 3, 5];
pub const MIN_FACTOR_WEIGHT_FLOOR: f64 = 0.01;
pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.50;
pub const CONFLUENCE_FLOOR: f64 = 40.0;
pub const SAME_SIDE_COOLDOWN_SECS: u64 = 12;

// ---- Entry filter ---------------------------------------------------------------
//
// Four risk modes, each pairing a minimum entry-filter score (0-100) with a
// minimum per-signal confidence floor.

pub const ENTRY_FILTER_MIN_SCORE_LOW_RISK: f64 = 60.0;
pub const ENTRY_FILTER_MIN_SCORE_HIGH_PROBABILITY: f64 = 70.0;
pub const ENTRY_FILTER_MIN_SCORE_AGGRESSIVE: f64 = 50.0;
pub const ENTRY_FILTER_MIN_SCORE_SNIPER: f64 = 75.0;

pub const ENTRY_FILTER_MIN_CONFIDENCE_LOW_RISK: f64 = 0.70;
pub const ENTRY_FILTER_MIN_CONFIDENCE_HIGH_PROBABILITY: f64 = 0.80;
pub const ENTRY_FILTER_MIN_CONFIDENCE_AGGRESSIVE: f64 = 0.60;
pub const ENTRY_FILTER_MIN_CONFIDENCE_SNIPER: f64 = 0.85;

pub const ENTRY_FILTER_WEIGHT_CONFIDENCE: f64 = 0.40;
pub const ENTRY_FILTER_WEIGHT_VOLATILITY: f64 = 0.25;
pub const ENTRY_FILTER_WEIGHT_TREND: f64 = 0.20;
pub const ENTRY_FILTER_WEIGHT_SESSION: f64 = 0.15;

// ---- Trade manager / martingale / circuit breaker --------------------------------

pub const MARTINGALE_MULTIPLIER: f64 = 2.0;
pub const MAX_MARTINGALE_LEVEL: u32 = 5;

pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 3;
pub const CIRCUIT_BREAKER_WINDOW_SECS: u64 = 60;
pub const CIRCUIT_BREAKER_PAUSE_SECS: u64 = 120;

pub const BUY_RESPONSE_TIMEOUT_SECS: u64 = 30;

pub const SESSION_SNAPSHOT_EVERY_N_TRADES: u32 = 5;
pub const SESSION_RECOVERY_MAX_AGE_SECS: i64 = 30 * 60;

pub const ROLLING_WIN_RATE_WINDOW: usize = 20;
pub const TRADE_RESULT_HISTORY_CAP: usize = 100;

// ---- Strategy Engine: indicator periods --------------------------------------------

pub const TICK_BUCKET_SIZE: usize = 5;
pub const ADX_PERIOD: usize = 14;
pub const EMA_FAST_PERIOD: usize = 9;
pub const EMA_SLOW_PERIOD: usize = 21;
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;
pub const HMA_PERIOD: usize = 16;
pub const ZSCORE_PERIOD: usize = 30;
pub const STOCHASTIC_PERIOD: usize = 14;
pub const STOCHASTIC_SMOOTHING: usize = 3;
pub const TICK_IMBALANCE_WINDOW: usize = 20;

// ---- Strategy Engine: signal synthesis thresholds ----------------------------------

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_ENTRY_BAND_LOW: (f64, f64) = (22.0, 30.0);
pub const RSI_ENTRY_BAND_HIGH: (f64, f64) = (70.0, 78.0);
pub const ADX_ALIGNMENT_MIN: f64 = 22.0;
pub const ADX_CONFLICT_MAGNITUDE: f64 = 15.0;
pub const PREDICTION_SCORE_THRESHOLD: f64 = 0.15;
pub const MULTI_HORIZON_MIN_CONFIDENCE: f64 = 0.55;
pub const MULTI_HORIZON_AGREE_ALL_BOOST: f64 = 0.15;
pub const MULTI_HORIZON_NEUTRAL_FLOOR: f64 = 0.25;
pub const CONFLUENCE_SUB_CHECK_COUNT: usize = 7;

// ---- Token store ------------------------------------------------------------------

pub const TOKEN_STORE_PBKDF2_ITERATIONS: u32 = 100_000;

// ---- Trade journal ------------------------------------------------------------------

pub const JOURNAL_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

// ---- Risk posture resolutions ------------------------------------------------------

/// Default for `RuntimeConfig::strategy_params.extreme_volatility_blocks_trading`:
/// whether an EXTREME volatility-zone classification hard-blocks new trades
/// outright, rather than merely being surfaced as a scored-not-blocked
/// reason. Operator-configurable at runtime; ships disabled.
pub const EXTREME_VOLATILITY_BLOCKS_TRADING: bool = false;

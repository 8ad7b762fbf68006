// =============================================================================
// Core enumerations shared across the engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional bet on a binary-option contract, or no bet at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Call,
    Put,
    Wait,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
            Self::Wait => write!(f, "WAIT"),
        }
    }
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Call => Self::Put,
            Self::Put => Self::Call,
            Self::Wait => Self::Wait,
        }
    }

    pub fn is_actionable(self) -> bool {
        !matches!(self, Self::Wait)
    }

    /// Deriv's wire-protocol `contract_type` string.
    pub fn as_contract_type(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
            Self::Wait => "",
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Wait
    }
}

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
    Killed,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Whether we are running against real funds or simulated (Deriv demo/real).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Demo,
    Real,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Real => write!(f, "Real"),
        }
    }
}

/// Trade Manager's state machine position (`IDLE -> RUNNING <-> WAITING_RESULT -> ... -> STOPPED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeManagerState {
    Idle,
    Running,
    WaitingResult,
    Stopped,
}

impl Default for TradeManagerState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for TradeManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
            Self::WaitingResult => write!(f, "WAITING_RESULT"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Market regime classification driving the prediction factor-weight profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Ranging,
    Transitional,
}

impl Default for Regime {
    fn default() -> Self {
        Self::Transitional
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Transitional => write!(f, "TRANSITIONAL"),
        }
    }
}

/// Account balance snapshot, as reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub balance: f64,
    pub currency: String,
    pub account_id: String,
    #[serde(default)]
    pub is_virtual: bool,
}

impl Default for BalanceInfo {
    fn default() -> Self {
        Self {
            balance: 0.0,
            currency: "USD".to_string(),
            account_id: String::new(),
            is_virtual: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposite_flips_call_put_but_not_wait() {
        assert_eq!(Direction::Call.opposite(), Direction::Put);
        assert_eq!(Direction::Put.opposite(), Direction::Call);
        assert_eq!(Direction::Wait.opposite(), Direction::Wait);
    }

    #[test]
    fn direction_is_actionable() {
        assert!(Direction::Call.is_actionable());
        assert!(Direction::Put.is_actionable());
        assert!(!Direction::Wait.is_actionable());
    }

    #[test]
    fn defaults_match_safety_posture() {
        assert_eq!(TradingMode::default(), TradingMode::Paused);
        assert_eq!(AccountMode::default(), AccountMode::Demo);
        assert_eq!(TradeManagerState::default(), TradeManagerState::Idle);
    }

    #[test]
    fn display_matches_wire_vocabulary() {
        assert_eq!(Direction::Call.to_string(), "CALL");
        assert_eq!(Direction::Put.to_string(), "PUT");
        assert_eq!(Regime::Trending.to_string(), "TRENDING");
    }
}

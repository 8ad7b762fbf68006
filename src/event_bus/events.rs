// =============================================================================
// Event bus payload types
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Channel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "tick")]
    Tick(TickEvent),
    #[serde(rename = "position_open")]
    PositionOpen(PositionOpenEvent),
    #[serde(rename = "position_update")]
    PositionUpdate(PositionUpdateEvent),
    #[serde(rename = "position_close")]
    PositionClose(PositionCloseEvent),
    #[serde(rename = "positions_reset")]
    PositionsReset(PositionsResetEvent),
    #[serde(rename = "balance_update")]
    Balance(BalanceUpdateEvent),
    #[serde(rename = "trade_history")]
    TradeHistory(TradeHistoryEvent),
    #[serde(rename = "status")]
    Status(StatusEvent),
}

impl Event {
    pub fn channel(&self) -> Channel {
        match self {
            Event::Tick(_) => Channel::Tick,
            Event::PositionOpen(_) | Event::PositionUpdate(_) | Event::PositionClose(_)
            | Event::PositionsReset(_) => Channel::Position,
            Event::Balance(_) => Channel::Balance,
            Event::TradeHistory(_) => Channel::Trade,
            Event::Status(_) => Channel::Status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub symbol: String,
    pub price: f64,
    /// Unix millis.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenEvent {
    pub contract_id: String,
    pub symbol: String,
    pub entry_price: f64,
    pub stake: f64,
    pub direction: String,
    pub martingale_level: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdateEvent {
    pub contract_id: String,
    pub current_price: f64,
    pub pnl: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCloseEvent {
    pub contract_id: String,
    pub symbol: String,
    pub exit_price: f64,
    pub profit: f64,
    pub is_win: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResetEvent {
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdateEvent {
    pub balance: f64,
    pub currency: String,
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryEvent {
    pub trade_id: String,
    pub symbol: String,
    pub direction: String,
    pub stake: f64,
    pub result: String,
    pub profit: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub is_trading: bool,
    pub is_connected: bool,
    pub account_type: String,
}

// =============================================================================
// Deriv wire-protocol message shapes
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    pub loginid: String,
    pub balance: f64,
    pub currency: String,
    #[serde(default)]
    pub is_virtual: u8,
}

impl AuthorizeResponse {
    pub fn is_virtual_account(&self) -> bool {
        self.is_virtual != 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickMsg {
    pub symbol: String,
    pub quote: f64,
    /// Unix seconds, as sent on the wire.
    pub epoch: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceMsg {
    pub balance: f64,
    pub currency: String,
    pub loginid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyRequest {
    pub buy: u32,
    pub price: f64,
    pub parameters: BuyParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyParameters {
    pub amount: f64,
    pub basis: String,
    pub contract_type: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
}

impl BuyRequest {
    pub fn new(stake: f64, contract_type: &str, symbol: &str, duration: u32, duration_unit: &str) -> Self {
        Self {
            buy: 1,
            price: stake,
            parameters: BuyParameters {
                amount: stake,
                basis: "stake".to_string(),
                contract_type: contract_type.to_string(),
                currency: "USD".to_string(),
                duration,
                duration_unit: duration_unit.to_string(),
                symbol: symbol.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyResponse {
    pub contract_id: i64,
    pub longcode: String,
    pub buy_price: f64,
    pub start_time: i64,
    pub transaction_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalOpenContract {
    pub contract_id: i64,
    #[serde(default)]
    pub is_sold: u8,
    #[serde(default)]
    pub is_expired: u8,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub sell_price: f64,
    #[serde(default)]
    pub status: String,
}

impl ProposalOpenContract {
    pub fn is_settled(&self) -> bool {
        self.is_sold != 0 || self.is_expired != 0
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_request_serializes_expected_shape() {
        let req = BuyRequest::new(1.0, "CALL", "R_100", 5, "t");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["buy"], 1);
        assert_eq!(value["parameters"]["contract_type"], "CALL");
        assert_eq!(value["parameters"]["duration_unit"], "t");
    }

    #[test]
    fn contract_settled_detection() {
        let mut poc = ProposalOpenContract {
            contract_id: 1,
            is_sold: 0,
            is_expired: 0,
            profit: 0.0,
            sell_price: 0.0,
            status: "open".into(),
        };
        assert!(!poc.is_settled());
        poc.is_expired = 1;
        poc.profit = 0.85;
        assert!(poc.is_settled());
        assert!(poc.is_win());
    }
}

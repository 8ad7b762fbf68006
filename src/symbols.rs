// =============================================================================
// Symbol catalog
// =============================================================================
//
// Deriv's synthetic-index and commodity symbols tradable by this engine. The
// set is fixed rather than discovered at runtime: each symbol carries its own
// duration unit, minimum stake and duration bounds, which the Trade Manager
// needs before it can build a `buy` request.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Whether a contract's duration is counted in ticks or in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Ticks,
    Days,
}

impl DurationUnit {
    pub fn as_wire_code(self) -> &'static str {
        match self {
            Self::Ticks => "t",
            Self::Days => "d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCategory {
    VolatilityIndex,
    Commodity,
}

/// Static trading parameters for one Deriv symbol.
#[derive(Debug, Clone)]
pub struct SymbolConfig {
    pub symbol: &'static str,
    pub name: &'static str,
    pub min_stake: f64,
    pub min_duration: u32,
    pub max_duration: u32,
    pub duration_unit: DurationUnit,
    pub category: SymbolCategory,
}

impl SymbolConfig {
    pub fn validate_duration(&self, duration: u32) -> Result<(), String> {
        if duration < self.min_duration || duration > self.max_duration {
            return Err(format!(
                "duration {} out of range [{}, {}] {} for {}",
                duration,
                self.min_duration,
                self.max_duration,
                self.duration_unit.as_wire_code(),
                self.symbol
            ));
        }
        Ok(())
    }
}

fn tick_index(symbol: &'static str, name: &'static str) -> SymbolConfig {
    SymbolConfig {
        symbol,
        name,
        min_stake: 0.50,
        min_duration: 5,
        max_duration: 10,
        duration_unit: DurationUnit::Ticks,
        category: SymbolCategory::VolatilityIndex,
    }
}

pub static SUPPORTED_SYMBOLS: Lazy<HashMap<&'static str, SymbolConfig>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for cfg in [
        tick_index("R_100", "Volatility 100 Index"),
        tick_index("R_75", "Volatility 75 Index"),
        tick_index("R_50", "Volatility 50 Index"),
        tick_index("R_25", "Volatility 25 Index"),
        tick_index("R_10", "Volatility 10 Index"),
        tick_index("1HZ100V", "Volatility 100 (1s) Index"),
        tick_index("1HZ75V", "Volatility 75 (1s) Index"),
        tick_index("1HZ50V", "Volatility 50 (1s) Index"),
        SymbolConfig {
            symbol: "frxXAUUSD",
            name: "Gold/USD",
            min_stake: 0.50,
            min_duration: 1,
            max_duration: 365,
            duration_unit: DurationUnit::Days,
            category: SymbolCategory::Commodity,
        },
    ] {
        map.insert(cfg.symbol, cfg);
    }
    map
});

pub fn lookup(symbol: &str) -> Option<&'static SymbolConfig> {
    SUPPORTED_SYMBOLS.get(symbol)
}

pub fn is_supported(symbol: &str) -> bool {
    SUPPORTED_SYMBOLS.contains_key(symbol)
}

pub fn all_symbols() -> Vec<&'static str> {
    let mut v: Vec<&'static str> = SUPPORTED_SYMBOLS.keys().copied().collect();
    v.sort_unstable();
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatility_indices_allow_five_to_ten_ticks() {
        let cfg = lookup("R_100").expect("R_100 must be supported");
        assert_eq!(cfg.duration_unit, DurationUnit::Ticks);
        assert!(cfg.validate_duration(5).is_ok());
        assert!(cfg.validate_duration(10).is_ok());
        assert!(cfg.validate_duration(4).is_err());
        assert!(cfg.validate_duration(11).is_err());
    }

    #[test]
    fn gold_allows_one_to_365_days() {
        let cfg = lookup("frxXAUUSD").expect("frxXAUUSD must be supported");
        assert_eq!(cfg.duration_unit, DurationUnit::Days);
        assert!(cfg.validate_duration(1).is_ok());
        assert!(cfg.validate_duration(365).is_ok());
        assert!(cfg.validate_duration(0).is_err());
        assert!(cfg.validate_duration(366).is_err());
    }

    #[test]
    fn unknown_symbol_is_not_supported() {
        assert!(!is_supported("EURUSD"));
        assert!(lookup("EURUSD").is_none());
    }

    #[test]
    fn all_nine_symbols_present() {
        assert_eq!(all_symbols().len(), 9);
    }

    #[test]
    fn minimum_stake_is_fifty_cents_everywhere() {
        for cfg in SUPPORTED_SYMBOLS.values() {
            assert_eq!(cfg.min_stake, 0.50, "{} has non-standard min stake", cfg.symbol);
        }
    }
}

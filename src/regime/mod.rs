// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market regime classification from ADX, +DI/-DI spread, and Bollinger Band
// Width percentile. Hurst exponent and Shannon entropy feed in as auxiliary
// confidence modifiers rather than primary classifiers.

pub mod detector;
pub mod entropy;
pub mod hurst;

pub use detector::{classify, compute_signals, confidence, RegimeDetector, RegimeSignals, RegimeState};
pub use entropy::ShannonEntropyFilter;
pub use hurst::calculate_hurst_exponent;

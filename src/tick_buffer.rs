// =============================================================================
// Per-symbol tick buffer
// =============================================================================
//
// A bounded FIFO of recent ticks per symbol, the tick-stream analogue of the
// teacher's `market_data::candle_buffer::CandleBuffer`. Indicators here work
// directly off the close-price series (`closes()`); ADX/ATR need an OHLC
// shape, so the buffer also exposes `synthetic_candles`, bucketing ticks into
// fixed-size groups and treating each bucket's first/last/min/max tick as
// open/close/low/high.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::constants::TICK_BUFFER_CAPACITY;

#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    /// Unix millis.
    pub timestamp: i64,
}

/// A synthetic OHLC candle built from a fixed-size bucket of ticks. There is
/// no volume on a synthetic-index tick feed, so unlike the teacher's
/// Binance-kline `Candle` this carries only the price/time shape ADX/ATR/
/// entropy actually consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

pub struct TickBuffer {
    buffers: RwLock<HashMap<String, VecDeque<Tick>>>,
    capacity: usize,
}

impl Default for TickBuffer {
    fn default() -> Self {
        Self::new(TICK_BUFFER_CAPACITY)
    }
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { buffers: RwLock::new(HashMap::new()), capacity }
    }

    pub fn push(&self, symbol: &str, tick: Tick) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        ring.push_back(tick);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.buffers.read().get(symbol).map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.buffers.read().get(symbol).and_then(|r| r.back()).map(|t| t.price)
    }

    pub fn last_timestamp(&self, symbol: &str) -> Option<i64> {
        self.buffers.read().get(symbol).and_then(|r| r.back()).map(|t| t.timestamp)
    }

    /// Closing prices, oldest-first, for indicator computation.
    pub fn closes(&self, symbol: &str) -> Vec<f64> {
        self.buffers
            .read()
            .get(symbol)
            .map(|r| r.iter().map(|t| t.price).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, symbol: &str) {
        self.buffers.write().remove(symbol);
    }

    /// Bucket the most recent ticks into synthetic OHLC candles of
    /// `bucket_size` ticks each, oldest-first. The trailing partial bucket
    /// (fewer than `bucket_size` ticks) is dropped so every candle is
    /// complete.
    pub fn synthetic_candles(&self, symbol: &str, bucket_size: usize) -> Vec<Candle> {
        if bucket_size == 0 {
            return Vec::new();
        }
        let map = self.buffers.read();
        let Some(ticks) = map.get(symbol) else {
            return Vec::new();
        };

        let mut candles = Vec::with_capacity(ticks.len() / bucket_size);
        let mut chunk_iter = ticks.iter().collect::<Vec<_>>();
        for chunk in chunk_iter.chunks_exact(bucket_size) {
            let open = chunk.first().unwrap().price;
            let close = chunk.last().unwrap().price;
            let high = chunk.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
            let low = chunk.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
            candles.push(Candle {
                open_time: chunk.first().unwrap().timestamp,
                close_time: chunk.last().unwrap().timestamp,
                open,
                high,
                low,
                close,
            });
        }
        chunk_iter.clear();
        candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_caps_at_capacity() {
        let buf = TickBuffer::new(5);
        for i in 0..10 {
            buf.push("R_100", Tick { price: i as f64, timestamp: i });
        }
        assert_eq!(buf.len("R_100"), 5);
        assert_eq!(buf.closes("R_100"), vec![5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn last_price_reflects_latest_tick() {
        let buf = TickBuffer::new(10);
        buf.push("R_100", Tick { price: 1.0, timestamp: 0 });
        buf.push("R_100", Tick { price: 2.0, timestamp: 1 });
        assert_eq!(buf.last_price("R_100"), Some(2.0));
    }

    #[test]
    fn unknown_symbol_returns_empty() {
        let buf = TickBuffer::new(10);
        assert!(buf.closes("UNKNOWN").is_empty());
        assert_eq!(buf.last_price("UNKNOWN"), None);
    }

    #[test]
    fn synthetic_candles_drop_partial_trailing_bucket() {
        let buf = TickBuffer::new(20);
        for i in 0..13 {
            buf.push("R_100", Tick { price: i as f64, timestamp: i });
        }
        let candles = buf.synthetic_candles("R_100", 5);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 0.0);
        assert_eq!(candles[0].close, 4.0);
        assert_eq!(candles[0].high, 4.0);
        assert_eq!(candles[0].low, 0.0);
    }
}

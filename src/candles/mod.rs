//! OHLC candles built from price ticks
//!
//! Every tick updates one open ("partial") candle per configured timeframe.
//! A partial is sealed into history when a tick lands in a later bucket.

mod aggregator;

pub use aggregator::{CandleAggregator, DEFAULT_MAX_HISTORY, DEFAULT_TIMEFRAMES};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, aligned to the timeframe
    pub period_start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Not tracked from ticks; always zero
    pub volume: Decimal,
}

impl Candle {
    /// Open a candle at `price`
    pub fn open_at(period_start: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            period_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
        }
    }

    /// Fold a tick into the candle
    pub fn update(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

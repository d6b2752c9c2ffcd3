//! Streaming tick → candle aggregation

use super::Candle;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Sealed candles kept per (market, timeframe)
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// 15m, 1h, 4h, 1d
pub const DEFAULT_TIMEFRAMES: [u32; 4] = [15, 60, 240, 1440];

#[derive(Debug, Default)]
struct Series {
    partial: Option<Candle>,
    history: VecDeque<Candle>,
}

/// Aggregates ticks into candles for a fixed set of timeframes
pub struct CandleAggregator {
    timeframes: Vec<u32>,
    max_history: usize,
    /// market id → timeframe minutes → series
    series: Mutex<HashMap<String, HashMap<u32, Series>>>,
}

impl CandleAggregator {
    /// Aggregator for the given timeframes (minutes) with the default history cap
    pub fn new(timeframes: Vec<u32>) -> Self {
        Self::with_max_history(timeframes, DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(timeframes: Vec<u32>, max_history: usize) -> Self {
        let mut timeframes: Vec<u32> = timeframes.into_iter().filter(|tf| *tf > 0).collect();
        timeframes.sort_unstable();
        timeframes.dedup();
        Self {
            timeframes,
            max_history: max_history.max(1),
            series: Mutex::new(HashMap::new()),
        }
    }

    /// Configured timeframes in minutes
    pub fn timeframes(&self) -> &[u32] {
        &self.timeframes
    }

    /// Feed a tick into every timeframe for `market_id`
    pub fn add_tick(&self, market_id: &str, timestamp: DateTime<Utc>, price: Decimal) {
        let mut series = self.series.lock();
        let by_timeframe = series.entry(market_id.to_string()).or_default();

        for &timeframe in &self.timeframes {
            let start = bucket_start(timestamp, timeframe);
            let entry = by_timeframe.entry(timeframe).or_default();

            match entry.partial.as_mut() {
                Some(partial) if partial.period_start == start => partial.update(price),
                _ => {
                    if let Some(sealed) = entry.partial.take() {
                        entry.history.push_back(sealed);
                        while entry.history.len() > self.max_history {
                            entry.history.pop_front();
                        }
                    }
                    entry.partial = Some(Candle::open_at(start, price));
                }
            }
        }
    }

    /// Up to `limit` most recent sealed candles, oldest first
    pub fn get_candles(&self, market_id: &str, timeframe: u32, limit: usize) -> Vec<Candle> {
        let series = self.series.lock();
        let Some(history) = series
            .get(market_id)
            .and_then(|by_tf| by_tf.get(&timeframe))
            .map(|s| &s.history)
        else {
            return Vec::new();
        };

        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Drop every series for `market_id`
    pub fn remove_market(&self, market_id: &str) -> bool {
        self.series.lock().remove(market_id).is_some()
    }

    /// Number of markets with at least one tick
    pub fn market_count(&self) -> usize {
        self.series.lock().len()
    }

    /// Most recent sealed candle; the open partial is never returned
    pub fn get_latest_candle(&self, market_id: &str, timeframe: u32) -> Option<Candle> {
        self.series
            .lock()
            .get(market_id)?
            .get(&timeframe)?
            .history
            .back()
            .cloned()
    }
}

impl Default for CandleAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEFRAMES.to_vec())
    }
}

/// Start of the `timeframe`-minute bucket containing `timestamp`
fn bucket_start(timestamp: DateTime<Utc>, timeframe: u32) -> DateTime<Utc> {
    let minutes = timestamp.timestamp().div_euclid(60);
    let tf = i64::from(timeframe);
    let start_minute = minutes.div_euclid(tf) * tf;
    DateTime::from_timestamp(start_minute * 60, 0).unwrap_or(timestamp)
}

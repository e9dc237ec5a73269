use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::models::{Candle, Interval, Tick};

/// Thread-safe builder that folds the live tick stream into OHLC candles.
///
/// Keeps a rolling window per symbol. A tick either updates the candle for
/// its interval bucket or opens a new one; buckets are aligned to wall-clock
/// interval boundaries so a 10:03:45 tick lands in the 10:03 one-minute
/// candle.
#[derive(Clone)]
pub struct CandleBuilder {
    data: Arc<RwLock<HashMap<String, VecDeque<Candle>>>>,
    interval: Interval,
    max_candles: usize,
}

impl CandleBuilder {
    pub fn new(interval: Interval, max_candles: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            interval,
            max_candles,
        }
    }

    /// Fold one tick into the window for its symbol.
    pub fn apply_tick(&self, tick: &Tick) {
        let bucket = bucket_start(tick.timestamp, self.interval);
        let mut data = self.data.write().unwrap();

        let candles = data.entry(tick.symbol.clone()).or_default();

        match candles.back_mut() {
            Some(current) if current.timestamp == bucket => {
                current.high = current.high.max(tick.ltp);
                current.low = current.low.min(tick.ltp);
                current.close = tick.ltp;
            }
            _ => {
                candles.push_back(Candle {
                    symbol: tick.symbol.clone(),
                    timestamp: bucket,
                    open: tick.ltp,
                    high: tick.ltp,
                    low: tick.ltp,
                    close: tick.ltp,
                    volume: 0.0,
                });

                while candles.len() > self.max_candles {
                    candles.pop_front();
                }
            }
        }
    }

    /// All candles built so far for a symbol, oldest first.
    pub fn series(&self, symbol: &str) -> Vec<Candle> {
        let data = self.data.read().unwrap();
        data.get(symbol)
            .map(|deque| deque.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The `n` most recent candles for a symbol, oldest first.
    pub fn recent(&self, symbol: &str, n: usize) -> Vec<Candle> {
        let data = self.data.read().unwrap();
        data.get(symbol)
            .map(|deque| deque.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, symbol: &str) -> usize {
        let data = self.data.read().unwrap();
        data.get(symbol).map(|d| d.len()).unwrap_or(0)
    }

    /// Drop every window. Called when a new trading session opens so stale
    /// candles from the previous day never feed a decision.
    pub fn clear_all(&self) {
        let mut data = self.data.write().unwrap();
        data.clear();
    }
}

/// Floor a timestamp to the start of its interval bucket.
fn bucket_start(ts: DateTime<Utc>, interval: Interval) -> DateTime<Utc> {
    let step = interval.minutes() * 60;
    let overshoot = ts.timestamp().rem_euclid(step);
    ts - Duration::seconds(overshoot) - Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick_at(symbol: &str, ltp: f64, hh: u32, mm: u32, ss: u32) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            ltp,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hh, mm, ss).unwrap(),
        }
    }

    #[test]
    fn test_ticks_in_same_minute_merge() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 3, 5));
        builder.apply_tick(&tick_at("TCS", 103.0, 4, 3, 20));
        builder.apply_tick(&tick_at("TCS", 98.5, 4, 3, 40));
        builder.apply_tick(&tick_at("TCS", 101.0, 4, 3, 59));

        let series = builder.series("TCS");
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].open, 100.0);
        assert_eq!(series[0].high, 103.0);
        assert_eq!(series[0].low, 98.5);
        assert_eq!(series[0].close, 101.0);
    }

    #[test]
    fn test_new_minute_opens_new_candle() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 3, 30));
        builder.apply_tick(&tick_at("TCS", 102.0, 4, 4, 1));

        let series = builder.series("TCS");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].close, 100.0);
        assert_eq!(series[1].open, 102.0);
    }

    #[test]
    fn test_bucket_alignment() {
        let builder = CandleBuilder::new(Interval::FiveMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 3, 45));

        let series = builder.series("TCS");
        assert_eq!(
            series[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rolling_window_trims_oldest() {
        let builder = CandleBuilder::new(Interval::OneMinute, 3);

        for mm in 0..6 {
            builder.apply_tick(&tick_at("TCS", 100.0 + mm as f64, 4, mm, 0));
        }

        let series = builder.series("TCS");
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].close, 103.0);
        assert_eq!(series[2].close, 105.0);
    }

    #[test]
    fn test_symbols_are_isolated() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 0, 0));
        builder.apply_tick(&tick_at("INFY", 1500.0, 4, 0, 0));

        assert_eq!(builder.count("TCS"), 1);
        assert_eq!(builder.count("INFY"), 1);
        assert_eq!(builder.series("INFY")[0].close, 1500.0);
    }

    #[test]
    fn test_recent_returns_newest_oldest_first() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        for mm in 0..10 {
            builder.apply_tick(&tick_at("TCS", 100.0 + mm as f64, 4, mm, 0));
        }

        let recent = builder.recent("TCS", 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].close, 107.0);
        assert_eq!(recent[2].close, 109.0);
    }

    #[test]
    fn test_clear_all() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 0, 0));
        builder.clear_all();

        assert_eq!(builder.count("TCS"), 0);
        assert!(builder.series("TCS").is_empty());
    }

    #[test]
    fn test_out_of_order_tick_starts_fresh_candle() {
        let builder = CandleBuilder::new(Interval::OneMinute, 100);

        builder.apply_tick(&tick_at("TCS", 100.0, 4, 5, 0));
        // Late tick from an earlier minute does not rewrite history
        builder.apply_tick(&tick_at("TCS", 99.0, 4, 4, 30));

        let series = builder.series("TCS");
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].open, 99.0);
    }
}

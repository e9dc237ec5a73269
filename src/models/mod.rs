use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candlestick for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Last traded price observation from the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub ltp: f64,
    pub timestamp: DateTime<Utc>,
}

/// Candle interval accepted by the market data API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Interval {
    OneMinute,
    FiveMinute,
    FifteenMinute,
    OneHour,
    OneDay,
}

impl Interval {
    /// Interval name in the broker's candle API
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "ONE_MINUTE",
            Interval::FiveMinute => "FIVE_MINUTE",
            Interval::FifteenMinute => "FIFTEEN_MINUTE",
            Interval::OneHour => "ONE_HOUR",
            Interval::OneDay => "ONE_DAY",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Interval::OneMinute => 1,
            Interval::FiveMinute => 5,
            Interval::FifteenMinute => 15,
            Interval::OneHour => 60,
            Interval::OneDay => 24 * 60,
        }
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Vote counts for one aggregation pass; never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub buy_count: usize,
    pub sell_count: usize,
}

/// Position in a stock
///
/// `peak_price` is the highest price observed since entry. It starts at the
/// entry price and only ratchets up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
    pub peak_price: f64,
    pub status: PositionStatus,
    pub realized_pnl: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Per-share profit at the given price (negative when losing)
    pub fn profit_per_share(&self, current_price: f64) -> f64 {
        current_price - self.entry_price
    }

    /// Whole days elapsed since entry
    pub fn days_held(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_days()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TrailingStop,
    TakeProfit,
    StopLoss,
    SellSignal,
    MaxHold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_creation() {
        let candle = Candle {
            symbol: "RELIANCE".to_string(),
            timestamp: Utc::now(),
            open: 2900.0,
            high: 2925.5,
            low: 2890.0,
            close: 2910.0,
            volume: 125000.0,
        };

        assert_eq!(candle.symbol, "RELIANCE");
        assert!(candle.high >= candle.low);
    }

    #[test]
    fn test_interval_api_names() {
        assert_eq!(Interval::OneMinute.as_api_str(), "ONE_MINUTE");
        assert_eq!(Interval::OneDay.as_api_str(), "ONE_DAY");
        assert_eq!(Interval::FiveMinute.minutes(), 5);
        assert_eq!(Interval::OneDay.minutes(), 1440);
    }

    #[test]
    fn test_position_helpers() {
        let position = Position {
            id: Uuid::new_v4(),
            symbol: "TCS".to_string(),
            entry_price: 100.0,
            quantity: 3.0,
            opened_at: Utc::now() - chrono::Duration::days(4),
            peak_price: 100.0,
            status: PositionStatus::Open,
            realized_pnl: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        };

        assert_eq!(position.profit_per_share(112.0), 12.0);
        assert_eq!(position.profit_per_share(95.0), -5.0);
        assert_eq!(position.days_held(Utc::now()), 4);
        assert_eq!(position.status, PositionStatus::Open);
    }

    #[test]
    fn test_position_serde_round_trip() {
        let position = Position {
            id: Uuid::new_v4(),
            symbol: "INFY".to_string(),
            entry_price: 1500.0,
            quantity: 2.0,
            opened_at: Utc::now(),
            peak_price: 1520.0,
            status: PositionStatus::Open,
            realized_pnl: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        };

        let json = serde_json::to_string(&position).unwrap();
        let restored: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.symbol, "INFY");
        assert_eq!(restored.peak_price, 1520.0);
        assert_eq!(restored.status, PositionStatus::Open);
    }
}

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::market_hours;
use crate::models::Candle;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady climb (+0.4% daily average with noise)
    Uptrend,
    /// Steady decline (-0.4% daily average with noise)
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large daily swings (±2.5%)
    Volatile,
    /// Gentle first half, then a 20% slide
    Selloff,
}

/// Generates synthetic daily price data for backtesting. Candles land on
/// trading days only and are stamped at the 15:30 IST close.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 1500.0,
            base_volume: 2_000_000.0,
        }
    }

    /// Generate `num_days` trading-day candles for the given scenario
    pub fn generate(&mut self, scenario: MarketScenario, num_days: usize) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_days);
        let mut current_price = self.base_price;
        let mean_price = self.base_price;

        for (i, timestamp) in session_closes(num_days).into_iter().enumerate() {
            let change = match scenario {
                MarketScenario::Uptrend => {
                    current_price * 0.004 + current_price * self.rng.gen_range(-0.003..0.003)
                }
                MarketScenario::Downtrend => {
                    current_price * -0.004 + current_price * self.rng.gen_range(-0.003..0.003)
                }
                MarketScenario::Sideways => {
                    (mean_price - current_price) * 0.1
                        + current_price * self.rng.gen_range(-0.008..0.008)
                }
                MarketScenario::Volatile => current_price * self.rng.gen_range(-0.025..0.025),
                MarketScenario::Selloff => {
                    if i < num_days / 2 {
                        current_price * self.rng.gen_range(-0.002..0.005)
                    } else {
                        let slide = -0.20 / (num_days as f64 / 2.0);
                        current_price * slide
                            + current_price * self.rng.gen_range(-0.003..0.003)
                    }
                }
            };

            current_price += change;
            if current_price < self.base_price * 0.3 {
                current_price = self.base_price * 0.3;
            }

            candles.push(self.create_candle(current_price, timestamp));
        }

        candles
    }

    /// Realistic daily OHLC around a close price
    fn create_candle(&mut self, price: f64, timestamp: DateTime<Utc>) -> Candle {
        let range_pct = 0.006;

        let high = price * (1.0 + self.rng.gen_range(0.0..range_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..range_pct));

        let open_raw = price * (1.0 + self.rng.gen_range(-range_pct..range_pct));
        let open = open_raw.clamp(low, high);

        let volume = self.base_volume * self.rng.gen_range(0.6..1.4);

        Candle {
            symbol: "SYNTH".to_string(),
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }
}

/// The next `num_days` session-close timestamps from a fixed anchor,
/// weekends skipped. IST has no DST, so the local conversion is never
/// ambiguous.
fn session_closes(num_days: usize) -> Vec<DateTime<Utc>> {
    let anchor = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut closes = Vec::with_capacity(num_days);
    let mut day = anchor;

    while closes.len() < num_days {
        if market_hours::is_trading_day(day.weekday()) {
            let close = Kolkata
                .from_local_datetime(&day.and_hms_opt(15, 30, 0).unwrap())
                .unwrap()
                .with_timezone(&Utc);
            closes.push(close);
        }
        day = day.succ_opt().unwrap();
    }

    closes
}

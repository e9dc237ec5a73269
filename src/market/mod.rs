pub mod candles;
pub mod smartapi;

pub use candles::CandleBuilder;
pub use smartapi::{Instrument, SmartApiClient, SmartApiCredentials};

use async_trait::async_trait;

use crate::error::BotError;
use crate::models::{Candle, Interval};

/// Read side of the market data feed.
///
/// The engine and the one-shot signal command talk to the broker through
/// this trait so tests can stand in a canned feed. Prices always flow
/// from here into the decision code, never the other way around.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Recent closed candles for `symbol`, oldest first, at most `bars` of them.
    async fn get_price_series(
        &self,
        symbol: &str,
        interval: Interval,
        bars: usize,
    ) -> Result<Vec<Candle>, BotError>;

    /// Last traded price for `symbol`.
    async fn get_quote(&self, symbol: &str) -> Result<f64, BotError>;
}

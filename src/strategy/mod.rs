// Signal generation module
//
// Three independent sources vote on every symbol: a pretrained classifier,
// an RSI threshold rule and a news-headline count. The aggregator folds the
// votes into one trading signal. A failing source degrades to a non-vote; it
// never takes the other sources down with it.

pub mod aggregator;
pub mod ai;
pub mod rsi_rule;
pub mod sentiment;

use serde::Deserialize;

use crate::models::Candle;

pub use aggregator::{aggregate, SignalDecision};
pub use ai::AiClassifier;
pub use rsi_rule::rsi_signal;
pub use sentiment::SentimentSource;

/// Thresholds for the signal sources and the sentiment gate
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    /// Headline counts strictly above this add a buy vote
    pub sentiment_buy_above: u32,
    /// Headline counts strictly below this add a sell vote
    pub sentiment_sell_below: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            short_ma_period: 10,
            long_ma_period: 20,
            sentiment_buy_above: 4,
            sentiment_sell_below: 2,
        }
    }
}

impl SignalConfig {
    /// Closes needed before every source has real readings
    pub fn min_history(&self) -> usize {
        self.long_ma_period.max(self.rsi_period + 1)
    }
}

/// All three sources plus the aggregation policy behind one call.
///
/// Owns the model handle and the news client so callers inject one value
/// instead of reaching for process globals.
pub struct SignalEngine {
    classifier: AiClassifier,
    news: SentimentSource,
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(classifier: AiClassifier, news: SentimentSource, config: SignalConfig) -> Self {
        Self {
            classifier,
            news,
            config,
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Evaluate all sources for one symbol and aggregate the votes.
    ///
    /// The news fetch is the only network call; its failure shows up as a
    /// missing count, not an error.
    pub async fn evaluate(&self, symbol: &str, candles: &[Candle]) -> SignalDecision {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let ai = self.classifier.signal(&closes, &self.config);
        let rsi = rsi_signal(&closes, &self.config);
        let news_count = self.news.fetch_count(symbol).await;

        aggregator::decide(symbol, ai, rsi, news_count, &self.config)
    }

    /// Evaluation without the news call. Backtests use this: headline
    /// counts have no history, so sentiment simply casts no vote.
    pub fn evaluate_offline(&self, symbol: &str, candles: &[Candle]) -> SignalDecision {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let ai = self.classifier.signal(&closes, &self.config);
        let rsi = rsi_signal(&closes, &self.config);

        aggregator::decide(symbol, ai, rsi, None, &self.config)
    }
}

/// Anything that can vote on a candle window. The backtest runner works
/// against this seam so scripted sources can drive it in tests.
pub trait SignalSource {
    fn name(&self) -> &str;

    /// Closes required before `decide` sees enough history
    fn min_history(&self) -> usize;

    fn decide(&self, symbol: &str, candles: &[Candle]) -> SignalDecision;
}

impl SignalSource for SignalEngine {
    fn name(&self) -> &str {
        "majority-vote"
    }

    fn min_history(&self) -> usize {
        self.config.min_history()
    }

    fn decide(&self, symbol: &str, candles: &[Candle]) -> SignalDecision {
        self.evaluate_offline(symbol, candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = SignalConfig::default();
        assert_eq!(config.rsi_period, 14);
        assert_eq!(config.rsi_oversold, 30.0);
        assert_eq!(config.rsi_overbought, 70.0);
        assert_eq!(config.sentiment_buy_above, 4);
        assert_eq!(config.sentiment_sell_below, 2);
    }

    #[test]
    fn test_min_history_covers_longest_source() {
        let config = SignalConfig::default();
        // MA20 needs 20 closes, RSI(14) needs 15
        assert_eq!(config.min_history(), 20);

        let config = SignalConfig {
            long_ma_period: 10,
            ..Default::default()
        };
        assert_eq!(config.min_history(), 15);
    }
}

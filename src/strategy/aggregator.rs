use crate::models::{Signal, VoteTally};

use super::SignalConfig;

/// One full evaluation: the per-source readings and the aggregate outcome
#[derive(Debug, Clone)]
pub struct SignalDecision {
    pub symbol: String,
    pub ai: Signal,
    pub rsi: Signal,
    /// Headline count when the scrape succeeded; `None` means the source
    /// was unavailable and cast no vote
    pub news_count: Option<u32>,
    pub tally: VoteTally,
    pub signal: Signal,
}

/// Majority vote over the three sources.
///
/// AI and RSI vote whenever they are not Hold. The headline count votes only
/// when it crosses a gate: strictly above `sentiment_buy_above` is a buy
/// vote, strictly below `sentiment_sell_below` a sell vote. In between, and
/// whenever the count is missing, sentiment abstains. Two buy votes make a
/// Buy, two sell votes a Sell, anything else (including a 1-1 tie) is Hold.
pub fn aggregate(
    ai: Signal,
    rsi: Signal,
    news_count: Option<u32>,
    config: &SignalConfig,
) -> (Signal, VoteTally) {
    let mut tally = VoteTally::default();

    for vote in [ai, rsi] {
        match vote {
            Signal::Buy => tally.buy_count += 1,
            Signal::Sell => tally.sell_count += 1,
            Signal::Hold => {}
        }
    }

    if let Some(count) = news_count {
        if count > config.sentiment_buy_above {
            tally.buy_count += 1;
        } else if count < config.sentiment_sell_below {
            tally.sell_count += 1;
        }
    }

    let signal = if tally.buy_count >= 2 {
        Signal::Buy
    } else if tally.sell_count >= 2 {
        Signal::Sell
    } else {
        Signal::Hold
    };

    (signal, tally)
}

/// Aggregate and record the full decision for the logging boundary
pub fn decide(
    symbol: &str,
    ai: Signal,
    rsi: Signal,
    news_count: Option<u32>,
    config: &SignalConfig,
) -> SignalDecision {
    let (signal, tally) = aggregate(ai, rsi, news_count, config);

    tracing::debug!(
        "{}: votes AI={:?} RSI={:?} news={:?} -> buy={} sell={} => {:?}",
        symbol,
        ai,
        rsi,
        news_count,
        tally.buy_count,
        tally.sell_count,
        signal
    );

    SignalDecision {
        symbol: symbol.to_string(),
        ai,
        rsi,
        news_count,
        tally,
        signal,
    }
}

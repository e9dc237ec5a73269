use crate::indicators::calculate_rsi;
use crate::models::Signal;

use super::SignalConfig;

/// RSI threshold rule: Buy below the oversold bound, Sell above the
/// overbought bound, Hold in between.
///
/// Too little history reads as neutral and votes Hold; the missing data
/// never looks like a real oversold print.
pub fn rsi_signal(closes: &[f64], config: &SignalConfig) -> Signal {
    let Some(rsi) = calculate_rsi(closes, config.rsi_period) else {
        tracing::debug!(
            "rsi rule: {} closes < {} needed, voting Hold",
            closes.len(),
            config.rsi_period + 1
        );
        return Signal::Hold;
    };

    if rsi < config.rsi_oversold {
        Signal::Buy
    } else if rsi > config.rsi_overbought {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

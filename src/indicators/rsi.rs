/// Relative Strength Index over the trailing `period` deltas.
///
/// `RSI = 100 - 100 / (1 + avg_gain / avg_loss)`, bounded to [0, 100].
/// Returns `None` when fewer than `period + 1` closes are available. A
/// window with zero average loss clamps to exactly 100.0 instead of
/// dividing by zero.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - (period + 1)..];

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change >= 0.0 {
            gain_sum += change;
        } else {
            loss_sum -= change;
        }
    }

    let avg_loss = loss_sum / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let avg_gain = gain_sum / period as f64;
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// RSI with the neutral fallback used during signal evaluation.
///
/// Too little history reads as 50.0, which sits between every sane
/// oversold/overbought threshold pair and therefore produces no vote.
pub fn rsi_or_neutral(closes: &[f64], period: usize) -> f64 {
    calculate_rsi(closes, period).unwrap_or(50.0)
}

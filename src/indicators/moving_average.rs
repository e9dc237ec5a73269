/// Simple moving average of the trailing `window` closes
pub fn calculate_sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }

    let tail = &closes[closes.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// values and smoothed with `k = 2 / (period + 1)` thereafter.
pub fn calculate_ema(closes: &[f64], period: usize) -> Option<f64> {
    ema_series(closes, period).and_then(|series| series.last().copied())
}

/// Full EMA series starting at index `period - 1` of the input.
///
/// Element 0 is the SMA seed; element `i` corresponds to input index
/// `period - 1 + i`. Returns `None` when the input is shorter than `period`.
pub fn ema_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);

    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * k + ema;
        series.push(ema);
    }

    Some(series)
}

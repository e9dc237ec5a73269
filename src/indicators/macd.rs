use super::moving_average::ema_series;

/// Latest MACD reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    /// Fast EMA minus slow EMA
    pub macd: f64,
    /// EMA of the MACD line
    pub signal: f64,
    /// MACD minus signal
    pub histogram: f64,
}

/// MACD with the standard 12/26/9 periods
pub fn calculate_macd(closes: &[f64]) -> Option<MacdOutput> {
    calculate_macd_with(closes, 12, 26, 9)
}

/// MACD line = EMA(fast) - EMA(slow); signal = EMA(signal_period) of the
/// MACD line. Needs `slow + signal_period - 1` closes.
pub fn calculate_macd_with(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdOutput> {
    if fast == 0 || signal_period == 0 || fast >= slow {
        return None;
    }

    let fast_ema = ema_series(closes, fast)?;
    let slow_ema = ema_series(closes, slow)?;

    // The fast series starts earlier; align both at the slow series start
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, slow_val)| fast_ema[i + offset] - slow_val)
        .collect();

    let signal_line = ema_series(&macd_line, signal_period)?;

    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;

    Some(MacdOutput {
        macd,
        signal,
        histogram: macd - signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_needs_slow_plus_signal_history() {
        let closes: Vec<f64> = (0..33).map(|i| 100.0 + i as f64).collect();
        assert!(calculate_macd(&closes).is_none());

        let closes: Vec<f64> = (0..34).map(|i| 100.0 + i as f64).collect();
        assert!(calculate_macd(&closes).is_some());
    }

    #[test]
    fn test_macd_constant_series_is_zero() {
        let closes = vec![250.0; 60];
        let out = calculate_macd(&closes).unwrap();

        assert!(out.macd.abs() < 1e-9);
        assert!(out.signal.abs() < 1e-9);
        assert!(out.histogram.abs() < 1e-9);
    }

    #[test]
    fn test_macd_positive_in_steady_uptrend() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let out = calculate_macd(&closes).unwrap();

        // The fast EMA lags less than the slow one, so a rising series
        // keeps the MACD line above zero
        assert!(out.macd > 0.0);
        assert!(out.signal > 0.0);
    }

    #[test]
    fn test_macd_histogram_identity() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        let out = calculate_macd(&closes).unwrap();

        assert!((out.histogram - (out.macd - out.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_rejects_degenerate_periods() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        assert!(calculate_macd_with(&closes, 26, 26, 9).is_none());
        assert!(calculate_macd_with(&closes, 12, 26, 0).is_none());
    }
}

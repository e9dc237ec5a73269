// Technical indicators module
// RSI, moving averages and MACD over close-price series

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{calculate_macd, calculate_macd_with, MacdOutput};
pub use moving_average::{calculate_ema, calculate_sma, ema_series};
pub use rsi::{calculate_rsi, rsi_or_neutral};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::execution::ExitPolicy;
use crate::market::{Instrument, SmartApiCredentials};
use crate::strategy::SignalConfig;

/// Capital limits for entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Cash the book starts with when there is no saved state.
    pub starting_cash: f64,
    /// Rupees committed per entry; share count is floored from this.
    pub per_trade_capital: f64,
    pub max_open_positions: usize,
    /// Entries allowed in a single scan pass.
    pub max_new_positions_per_scan: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            starting_cash: 100_000.0,
            per_trade_capital: 5_000.0,
            max_open_positions: 5,
            max_new_positions_per_scan: 2,
        }
    }
}

/// Loop timing and lookback windows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between quote polls that feed ticks and exit checks.
    pub quote_poll_seconds: u64,
    /// Minutes between full signal scans.
    pub scan_interval_minutes: u32,
    /// Daily candles pulled for each signal evaluation.
    pub history_bars: usize,
    /// Intraday candles kept per symbol in the tick builder.
    pub candle_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_poll_seconds: 30,
            scan_interval_minutes: 5,
            history_bars: 90,
            candle_window: 500,
        }
    }
}

/// Everything the bot reads at startup.
///
/// Layered from `stockbot.toml` (or an explicit path) with `STOCKBOT_*`
/// environment overrides on top, e.g. `STOCKBOT_SMARTAPI__ACCESS_TOKEN`
/// maps to `smartapi.access_token`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watchlist: Vec<Instrument>,
    pub trading: TradingConfig,
    pub signals: SignalConfig,
    pub exit: ExitPolicy,
    pub engine: EngineConfig,
    pub smartapi: SmartApiCredentials,
    pub model_path: String,
    pub holdings_path: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            trading: TradingConfig::default(),
            signals: SignalConfig::default(),
            exit: ExitPolicy::default(),
            engine: EngineConfig::default(),
            smartapi: SmartApiCredentials::default(),
            model_path: "models/signal.onnx".to_string(),
            holdings_path: "holdings.json".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings, looking for `stockbot.toml` in the working
    /// directory unless an explicit path is given. A missing default
    /// file just means defaults plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("stockbot").required(false)),
        };

        let raw = builder
            .add_source(config::Environment::with_prefix("STOCKBOT").separator("__"))
            .build()
            .context("Failed to load configuration")?;

        let settings: Settings = raw
            .try_deserialize()
            .context("Configuration did not match the expected shape")?;

        Ok(settings)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.watchlist.iter().map(|i| i.symbol.clone()).collect()
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use stockbot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use stockbot::config::Settings;
use stockbot::engine::TradeEngine;
use stockbot::execution::PositionBook;
use stockbot::market::{MarketData, SmartApiClient};
use stockbot::models::Interval;
use stockbot::news::NewsClient;
use stockbot::persistence::HoldingsStore;
use stockbot::strategy::{AiClassifier, SentimentSource, SignalEngine};

#[derive(Parser)]
#[command(name = "stockbot", version, about = "NSE swing-trading bot")]
struct Cli {
    /// Path to a TOML config file (defaults to stockbot.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live trading engine
    Run,
    /// Replay broker history or a synthetic scenario through the signal pipeline
    Backtest {
        /// Watchlist symbol to fetch real daily candles for
        #[arg(long, conflicts_with = "scenario")]
        symbol: Option<String>,
        /// uptrend, downtrend, sideways, volatile or selloff
        #[arg(long, default_value = "uptrend")]
        scenario: String,
        /// Trading days to replay
        #[arg(long, default_value_t = 250)]
        days: usize,
        /// Generator seed for synthetic runs
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Evaluate every watchlist symbol once and print the votes
    Signal,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    setup_logging(&settings.log_level);

    match cli.command {
        Command::Run => run_engine(settings).await,
        Command::Backtest {
            symbol,
            scenario,
            days,
            seed,
        } => run_backtest(&settings, symbol.as_deref(), &scenario, days, seed).await,
        Command::Signal => scan_signals(settings).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn setup_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(format!("stockbot={},stockbot::strategy=debug", level))
        .init();
}

fn build_market_client(settings: &Settings) -> Result<SmartApiClient> {
    SmartApiClient::new(settings.smartapi.clone(), settings.watchlist.clone())
        .context("Failed to build SmartAPI client")
}

fn build_signal_engine(settings: &Settings, with_news: bool) -> SignalEngine {
    let classifier = AiClassifier::load(&settings.model_path);

    let news = if with_news {
        match NewsClient::new() {
            Ok(client) => SentimentSource::new(client),
            Err(e) => {
                tracing::warn!("✗ News client unavailable, sentiment will abstain: {}", e);
                SentimentSource::disabled()
            }
        }
    } else {
        SentimentSource::disabled()
    };

    SignalEngine::new(classifier, news, settings.signals.clone())
}

fn load_book(settings: &Settings, store: &HoldingsStore) -> PositionBook {
    match store.load() {
        Ok(Some(state)) => {
            tracing::info!(
                "✓ Restored {} position(s) and ₹{:.2} cash",
                state.positions.len(),
                state.cash
            );
            PositionBook::from_state(state.positions, state.cash, settings.exit.clone())
        }
        Ok(None) => {
            tracing::info!(
                "No saved holdings, starting fresh with ₹{:.2}",
                settings.trading.starting_cash
            );
            PositionBook::new(settings.trading.starting_cash, settings.exit.clone())
        }
        Err(e) => {
            tracing::warn!(
                "✗ Holdings file unreadable, starting fresh with ₹{:.2}: {:#}",
                settings.trading.starting_cash,
                e
            );
            PositionBook::new(settings.trading.starting_cash, settings.exit.clone())
        }
    }
}

fn log_configuration(settings: &Settings) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Starting Cash: ₹{:.2}", settings.trading.starting_cash);
    tracing::info!(
        "  Per-Trade Capital: ₹{:.2}",
        settings.trading.per_trade_capital
    );
    tracing::info!(
        "  Max Open Positions: {}",
        settings.trading.max_open_positions
    );
    tracing::info!(
        "  Exit Policy: TP ₹{:.2} / SL ₹{:.2} / trail ₹{:.2} / {}d max hold",
        settings.exit.take_profit,
        settings.exit.stop_loss,
        settings.exit.trailing_buffer,
        settings.exit.max_hold_days
    );
    tracing::info!("  Watchlist: {} symbols", settings.watchlist.len());
    for instrument in &settings.watchlist {
        tracing::info!("    - {} ({})", instrument.symbol, instrument.exchange);
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_engine(settings: Settings) -> Result<()> {
    tracing::info!("🚀 stockbot starting - Multi-Loop Architecture");

    if settings.watchlist.is_empty() {
        bail!("Watchlist is empty, add instruments to the config");
    }

    log_configuration(&settings);

    let market = build_market_client(&settings)?;
    let signals = build_signal_engine(&settings, true);

    let store = HoldingsStore::new(&settings.holdings_path);
    let book = Arc::new(Mutex::new(load_book(&settings, &store)));

    let engine = TradeEngine::new(&settings, Arc::new(market), signals, book, store);
    engine.run().await
}

async fn run_backtest(
    settings: &Settings,
    symbol: Option<&str>,
    scenario: &str,
    days: usize,
    seed: u64,
) -> Result<()> {
    // Historical candles have no headlines, so sentiment stays out
    let signals = build_signal_engine(settings, false);
    let runner = BacktestRunner::from_settings(settings);

    match symbol {
        Some(symbol) => {
            let market = build_market_client(settings)?;
            let candles = market
                .get_price_series(symbol, Interval::OneDay, days)
                .await
                .with_context(|| format!("Failed to fetch history for {}", symbol))?;
            runner.run_and_report(&signals, &candles, symbol, "broker history")?;
        }
        None => {
            let scenario_kind = parse_scenario(scenario)?;
            let mut generator = SyntheticDataGenerator::new(seed);
            let candles = generator.generate(scenario_kind, days);
            runner.run_and_report(&signals, &candles, "SYNTH", scenario)?;
        }
    }

    Ok(())
}

async fn scan_signals(settings: Settings) -> Result<()> {
    if settings.watchlist.is_empty() {
        bail!("Watchlist is empty, add instruments to the config");
    }

    let market = build_market_client(&settings)?;
    let signals = build_signal_engine(&settings, true);
    let bars = settings.engine.history_bars;

    println!("\n🔍 Evaluating {} symbol(s)...\n", settings.watchlist.len());

    for symbol in settings.symbols() {
        let series = match market.get_price_series(&symbol, Interval::OneDay, bars).await {
            Ok(series) => series,
            Err(e) => {
                println!("  ✗ {}: history unavailable ({})", symbol, e);
                continue;
            }
        };

        let decision = signals.evaluate(&symbol, &series).await;
        let news = match decision.news_count {
            Some(count) => format!("{} headlines", count),
            None => "no data".to_string(),
        };

        println!(
            "  {} → {:?}  [AI {:?} | RSI {:?} | news {}]  votes {}-{}",
            decision.symbol,
            decision.signal,
            decision.ai,
            decision.rsi,
            news,
            decision.tally.buy_count,
            decision.tally.sell_count
        );
    }

    println!();
    Ok(())
}

fn parse_scenario(name: &str) -> Result<MarketScenario> {
    let scenario = match name.to_ascii_lowercase().as_str() {
        "uptrend" => MarketScenario::Uptrend,
        "downtrend" => MarketScenario::Downtrend,
        "sideways" => MarketScenario::Sideways,
        "volatile" => MarketScenario::Volatile,
        "selloff" => MarketScenario::Selloff,
        other => bail!(
            "Unknown scenario '{}', expected uptrend, downtrend, sideways, volatile or selloff",
            other
        ),
    };

    Ok(scenario)
}

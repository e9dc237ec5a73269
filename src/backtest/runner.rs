use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backtest::metrics::BacktestMetrics;
use crate::config::Settings;
use crate::execution::{ExecutionAction, Executor, ExitPolicy, PositionBook};
use crate::models::{Candle, Signal};
use crate::strategy::SignalSource;

const DEFAULT_BROKERAGE_PER_ORDER: f64 = 20.0;

/// Backtest runner that replays daily candles through the same executor
/// and book the live engine uses
pub struct BacktestRunner {
    starting_cash: f64,
    per_trade_capital: f64,
    max_open_positions: usize,
    policy: ExitPolicy,
    brokerage_per_order: f64,
}

impl BacktestRunner {
    pub fn new(
        starting_cash: f64,
        per_trade_capital: f64,
        max_open_positions: usize,
        policy: ExitPolicy,
    ) -> Self {
        Self {
            starting_cash,
            per_trade_capital,
            max_open_positions,
            policy,
            brokerage_per_order: DEFAULT_BROKERAGE_PER_ORDER,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.trading.starting_cash,
            settings.trading.per_trade_capital,
            settings.trading.max_open_positions,
            settings.exit.clone(),
        )
    }

    /// Flat order fee applied per entry and per exit when netting P&L
    pub fn with_brokerage(mut self, per_order: f64) -> Self {
        self.brokerage_per_order = per_order;
        self
    }

    /// Replay the candles through the signal source.
    ///
    /// Exit triggers are checked on every bar close before the fresh
    /// signal is processed, the same order the live engine uses. Positions
    /// still open at the end stay open; their unrealized P&L shows up in
    /// the final portfolio value only.
    pub fn run<S: SignalSource>(
        &self,
        source: &S,
        candles: &[Candle],
        symbol: &str,
    ) -> Result<BacktestMetrics> {
        let min_history = source.min_history();

        if candles.len() <= min_history {
            bail!(
                "Not enough candles for backtest, need {}, got {}",
                min_history + 1,
                candles.len()
            );
        }

        tracing::info!(
            "Starting backtest: {} candles, source needs {}",
            candles.len(),
            min_history
        );

        let book = Arc::new(Mutex::new(PositionBook::new(
            self.starting_cash,
            self.policy.clone(),
        )));
        let executor = Executor::new(
            book.clone(),
            self.per_trade_capital,
            self.max_open_positions,
        );

        let no_signals: HashMap<String, Signal> = HashMap::new();
        let mut buy_signals = 0usize;
        let mut buy_signal_hits = 0usize;

        for i in min_history..candles.len() {
            let window = &candles[i - min_history..=i];
            let bar = &candles[i];
            let price = bar.close;

            // Exit triggers first, on the bar close
            {
                let mut prices = HashMap::new();
                prices.insert(symbol.to_string(), price);
                let closed = book
                    .lock()
                    .unwrap()
                    .check_exits_at(&prices, &no_signals, bar.timestamp);
                if !closed.is_empty() {
                    tracing::debug!("Bar {}: closed {} position(s)", i, closed.len());
                }
            }

            let decision = source.decide(symbol, window);

            // Signal quality sample: did the next close move up after a Buy?
            if decision.signal == Signal::Buy && i + 1 < candles.len() {
                buy_signals += 1;
                if candles[i + 1].close > price {
                    buy_signal_hits += 1;
                }
            }

            let exec = executor.process_signal(decision.signal, symbol, price, bar.timestamp);

            match exec.action {
                ExecutionAction::Execute { quantity } => {
                    let opened = book.lock().unwrap().open_position_at(
                        symbol.to_string(),
                        price,
                        quantity,
                        bar.timestamp,
                    );
                    match opened {
                        Ok(_) => {
                            tracing::debug!("Bar {}: opened @ {:.2} x{}", i, price, quantity)
                        }
                        Err(e) => tracing::debug!("Bar {}: entry rejected: {}", i, e),
                    }
                }
                ExecutionAction::Close {
                    position_id,
                    exit_reason,
                } => {
                    if let Err(e) = book.lock().unwrap().close_position_at(
                        position_id,
                        price,
                        exit_reason,
                        bar.timestamp,
                    ) {
                        tracing::debug!("Bar {}: close rejected: {}", i, e);
                    }
                }
                ExecutionAction::Skip => {}
            }
        }

        let final_close = candles[candles.len() - 1].close;
        let book = book.lock().unwrap();
        let final_value = {
            let mut marks = HashMap::new();
            marks.insert(symbol.to_string(), final_close);
            book.portfolio_value(&marks)
        };

        let mut metrics = BacktestMetrics::from_positions(
            book.positions(),
            self.starting_cash,
            final_value,
            self.brokerage_per_order,
        );
        metrics.set_signal_stats(buy_signals, buy_signal_hits);

        tracing::info!(
            "Backtest complete: {} trades, P&L ₹{:.2} ({:+.2}%)",
            metrics.total_trades,
            metrics.total_pnl,
            metrics.total_return_pct
        );

        Ok(metrics)
    }

    /// Run backtest and print report
    pub fn run_and_report<S: SignalSource>(
        &self,
        source: &S,
        candles: &[Candle],
        symbol: &str,
        scenario_name: &str,
    ) -> Result<BacktestMetrics> {
        println!("\n🔬 Running backtest: {}", scenario_name);
        println!("   Source: {}", source.name());
        println!("   Candles: {}", candles.len());
        println!("   Starting Cash: ₹{:.2}", self.starting_cash);

        let metrics = self.run(source, candles, symbol)?;
        metrics.print_report();

        Ok(metrics)
    }
}

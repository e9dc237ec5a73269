use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExitReason, Position, PositionStatus};

/// Record of a single closed trade for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub holding_days: i64,
    pub exit_reason: ExitReason,
    /// Flat order fees for the round trip (entry plus exit)
    pub brokerage: f64,
    pub net_pnl: f64,
}

impl TradeRecord {
    pub fn from_position(position: &Position, brokerage_round_trip: f64) -> Option<Self> {
        if let (Some(exit_price), Some(exit_time), Some(realized_pnl), Some(exit_reason)) = (
            position.exit_price,
            position.exit_time,
            position.realized_pnl,
            position.exit_reason,
        ) {
            let holding_days = (exit_time - position.opened_at).num_days();
            let pnl_pct = ((exit_price - position.entry_price) / position.entry_price) * 100.0;

            Some(Self {
                symbol: position.symbol.clone(),
                entry_time: position.opened_at,
                exit_time,
                entry_price: position.entry_price,
                exit_price,
                quantity: position.quantity,
                pnl: realized_pnl,
                pnl_pct,
                holding_days,
                exit_reason,
                brokerage: brokerage_round_trip,
                net_pnl: realized_pnl - brokerage_round_trip,
            })
        } else {
            None
        }
    }
}

/// Complete backtest performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // P&L
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub initial_portfolio_value: f64,
    pub final_portfolio_value: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L distribution
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // Holding period
    pub avg_holding_days: f64,
    pub max_holding_days: i64,

    // Costs
    pub total_brokerage: f64,
    pub net_pnl: f64,
    pub net_return_pct: f64,

    // Signal quality
    /// Buy decisions emitted during the run, entered or not
    pub buy_signals: usize,
    /// Share of buy signals followed by a higher close on the next bar
    pub buy_signal_hit_rate: f64,

    /// Positions still open when the data ran out; their unrealized P&L is
    /// in `final_portfolio_value` but not in the trade statistics
    pub open_at_end: usize,

    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    /// Build metrics from the book's positions after a run. Only closed
    /// positions produce trade records.
    pub fn from_positions(
        positions: &[Position],
        initial_portfolio_value: f64,
        final_portfolio_value: f64,
        brokerage_per_order: f64,
    ) -> Self {
        let open_at_end = positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .count();

        let round_trip = brokerage_per_order * 2.0;
        let trades: Vec<TradeRecord> = positions
            .iter()
            .filter_map(|p| TradeRecord::from_position(p, round_trip))
            .collect();

        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::empty(
                initial_portfolio_value,
                final_portfolio_value,
                open_at_end,
            );
        }

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_return_pct =
            ((final_portfolio_value - initial_portfolio_value) / initial_portfolio_value) * 100.0;

        let winners: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > 0.0).collect();
        let losers: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl <= 0.0).collect();

        let winning_trades = winners.len();
        let losing_trades = losers.len();
        let win_rate = (winning_trades as f64 / total_trades as f64) * 100.0;

        let total_wins: f64 = winners.iter().map(|t| t.pnl).sum();
        let total_losses: f64 = losers.iter().map(|t| t.pnl.abs()).sum();

        let avg_win = if winning_trades > 0 {
            total_wins / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            total_losses / losing_trades as f64
        } else {
            0.0
        };

        let largest_win = winners
            .iter()
            .map(|t| t.pnl)
            .max_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap_or(0.0);
        let largest_loss = losers
            .iter()
            .map(|t| t.pnl)
            .min_by(|a, b| a.partial_cmp(b).unwrap())
            .unwrap_or(0.0);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) =
            Self::calculate_drawdown(&trades, initial_portfolio_value);
        let sharpe_ratio = Self::calculate_sharpe_ratio(&trades);

        let holding_days: Vec<i64> = trades.iter().map(|t| t.holding_days).collect();
        let avg_holding_days =
            holding_days.iter().sum::<i64>() as f64 / holding_days.len() as f64;
        let max_holding_days = *holding_days.iter().max().unwrap_or(&0);

        let total_brokerage: f64 = trades.iter().map(|t| t.brokerage).sum();
        let net_pnl = total_pnl - total_brokerage;
        let net_return_pct = ((final_portfolio_value - total_brokerage
            - initial_portfolio_value)
            / initial_portfolio_value)
            * 100.0;

        Self {
            total_pnl,
            total_return_pct,
            initial_portfolio_value,
            final_portfolio_value,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            avg_holding_days,
            max_holding_days,
            total_brokerage,
            net_pnl,
            net_return_pct,
            buy_signals: 0,
            buy_signal_hit_rate: 0.0,
            open_at_end,
            trades,
        }
    }

    fn empty(
        initial_portfolio_value: f64,
        final_portfolio_value: f64,
        open_at_end: usize,
    ) -> Self {
        let total_return_pct =
            ((final_portfolio_value - initial_portfolio_value) / initial_portfolio_value) * 100.0;

        Self {
            total_pnl: 0.0,
            total_return_pct,
            initial_portfolio_value,
            final_portfolio_value,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            avg_holding_days: 0.0,
            max_holding_days: 0,
            total_brokerage: 0.0,
            net_pnl: 0.0,
            net_return_pct: total_return_pct,
            buy_signals: 0,
            buy_signal_hit_rate: 0.0,
            open_at_end,
            trades: vec![],
        }
    }

    /// Record how often a Buy call preceded a rising next bar. The runner
    /// supplies the counts; buys the executor skipped still count as calls.
    pub fn set_signal_stats(&mut self, buy_signals: usize, hits: usize) {
        self.buy_signals = buy_signals;
        self.buy_signal_hit_rate = if buy_signals > 0 {
            (hits as f64 / buy_signals as f64) * 100.0
        } else {
            0.0
        };
    }

    /// How many trades each exit trigger closed
    pub fn exit_counts(&self) -> Vec<(ExitReason, usize)> {
        [
            ExitReason::TrailingStop,
            ExitReason::TakeProfit,
            ExitReason::StopLoss,
            ExitReason::SellSignal,
            ExitReason::MaxHold,
        ]
        .into_iter()
        .map(|reason| {
            let count = self
                .trades
                .iter()
                .filter(|t| t.exit_reason == reason)
                .count();
            (reason, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
    }

    /// Walk realized P&L in trade order and track the deepest dip below
    /// the running peak.
    fn calculate_drawdown(trades: &[TradeRecord], initial_value: f64) -> (f64, f64) {
        let mut peak = initial_value;
        let mut max_dd = 0.0;
        let mut current_value = initial_value;

        for trade in trades {
            current_value += trade.pnl;

            if current_value > peak {
                peak = current_value;
            }

            let drawdown = peak - current_value;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }

        let max_dd_pct = if peak > 0.0 {
            (max_dd / peak) * 100.0
        } else {
            0.0
        };

        (max_dd, max_dd_pct)
    }

    /// Simplified Sharpe over per-trade returns, zero risk-free rate
    fn calculate_sharpe_ratio(trades: &[TradeRecord]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;

        let variance = returns
            .iter()
            .map(|r| {
                let diff = r - mean_return;
                diff * diff
            })
            .sum::<f64>()
            / returns.len() as f64;
        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            mean_return / std_dev
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Portfolio:     ₹{:.2}", self.initial_portfolio_value);
        println!("  Final Portfolio:       ₹{:.2}", self.final_portfolio_value);
        println!(
            "  Gross P&L:             ₹{:.2} ({:+.2}%)",
            self.total_pnl, self.total_return_pct
        );
        println!("  Brokerage:             ₹{:.2}", self.total_brokerage);
        println!(
            "  Net P&L:               ₹{:.2} ({:+.2}%)",
            self.net_pnl, self.net_return_pct
        );

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);
        if self.buy_signals > 0 {
            println!(
                "  Buy Signals:           {} ({:.1}% next-bar hit)",
                self.buy_signals, self.buy_signal_hit_rate
            );
        }
        if self.open_at_end > 0 {
            println!("  Still Open:            {}", self.open_at_end);
        }

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ₹{:.2}", self.avg_win);
            println!("  Average Loss:          ₹{:.2}", self.avg_loss);
            println!("  Largest Win:           ₹{:.2}", self.largest_win);
            println!("  Largest Loss:          ₹{:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);

            println!("\n⚠ RISK METRICS");
            println!(
                "  Max Drawdown:          ₹{:.2} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

            println!("\n⏱ HOLDING PERIODS");
            println!("  Average:               {:.1} days", self.avg_holding_days);
            println!("  Max:                   {} days", self.max_holding_days);

            println!("\n🚪 EXIT BREAKDOWN");
            for (reason, count) in self.exit_counts() {
                println!("  {:?}: {}", reason, count);
            }
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

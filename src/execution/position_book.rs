use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::models::{ExitReason, Position, PositionStatus, Signal};

/// Exit thresholds, all in absolute rupees per share.
///
/// A threshold of 10.0 means ten rupees of per-share movement, not ten
/// percent. Percent-based exits would need entry-relative scaling that
/// the rest of the book does not do.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    pub take_profit: f64,
    pub stop_loss: f64,
    pub trailing_buffer: f64,
    pub max_hold_days: i64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            take_profit: 10.0,
            stop_loss: 3.0,
            trailing_buffer: 2.0,
            max_hold_days: 5,
        }
    }
}

impl ExitPolicy {
    /// First exit trigger that fires for a position, checked in fixed
    /// priority order:
    ///
    /// 1. Trailing stop: in profit and price has fallen more than
    ///    `trailing_buffer` below the peak
    /// 2. Take profit
    /// 3. Stop loss
    /// 4. Fresh sell signal from this scan
    /// 5. Held past `max_hold_days`
    ///
    /// Returns `None` when the position should stay open.
    pub fn evaluate(
        &self,
        position: &Position,
        current_price: f64,
        fresh_signal: Signal,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        let profit = position.profit_per_share(current_price);

        if profit > 0.0 && current_price < position.peak_price - self.trailing_buffer {
            return Some(ExitReason::TrailingStop);
        }

        if profit >= self.take_profit {
            return Some(ExitReason::TakeProfit);
        }

        if profit <= -self.stop_loss {
            return Some(ExitReason::StopLoss);
        }

        if fresh_signal == Signal::Sell {
            return Some(ExitReason::SellSignal);
        }

        if position.days_held(now) >= self.max_hold_days {
            return Some(ExitReason::MaxHold);
        }

        None
    }
}

/// All positions the bot has taken, open and closed, plus the cash that
/// backs them.
///
/// At most one open position per symbol. Exit checks never run against
/// a price the caller could not fetch; a symbol missing from the price
/// map is left untouched.
pub struct PositionBook {
    positions: Vec<Position>,
    cash: f64,
    policy: ExitPolicy,
}

impl PositionBook {
    pub fn new(starting_cash: f64, policy: ExitPolicy) -> Self {
        Self {
            positions: Vec::new(),
            cash: starting_cash,
            policy,
        }
    }

    /// Rebuild the book from persisted state.
    pub fn from_state(positions: Vec<Position>, cash: f64, policy: ExitPolicy) -> Self {
        Self {
            positions,
            cash,
            policy,
        }
    }

    pub fn policy(&self) -> &ExitPolicy {
        &self.policy
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Every position ever taken, including closed ones.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.get_open_position(symbol).is_some()
    }

    pub fn get_open_position(&self, symbol: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.symbol == symbol && p.status == PositionStatus::Open)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .collect()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .count()
    }

    /// Open a position at the current time.
    pub fn open_position(&mut self, symbol: String, price: f64, quantity: f64) -> Result<Uuid> {
        self.open_position_at(symbol, price, quantity, Utc::now())
    }

    /// Open a position with an explicit entry time.
    pub fn open_position_at(
        &mut self,
        symbol: String,
        price: f64,
        quantity: f64,
        time: DateTime<Utc>,
    ) -> Result<Uuid> {
        if self.has_open_position(&symbol) {
            bail!("Already have open position for {}", symbol);
        }

        let cost = price * quantity;
        if cost > self.cash {
            bail!(
                "Insufficient cash for {}: need {:.2}, have {:.2}",
                symbol,
                cost,
                self.cash
            );
        }

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            entry_price: price,
            quantity,
            opened_at: time,
            peak_price: price,
            status: PositionStatus::Open,
            realized_pnl: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        };

        let id = position.id;
        self.cash -= cost;
        self.positions.push(position);

        info!("📈 Opened {} x{} @ {:.2}", symbol, quantity, price);
        Ok(id)
    }

    /// Ratchet the peak price for an open position. Prices below the
    /// current peak leave it unchanged.
    pub fn observe_price(&mut self, symbol: &str, price: f64) {
        if let Some(position) = self
            .positions
            .iter_mut()
            .find(|p| p.symbol == symbol && p.status == PositionStatus::Open)
        {
            if price > position.peak_price {
                position.peak_price = price;
            }
        }
    }

    /// Exit trigger for the open position in `symbol`, if any fires.
    pub fn should_exit(
        &self,
        symbol: &str,
        current_price: f64,
        fresh_signal: Signal,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        let position = self.get_open_position(symbol)?;
        self.policy.evaluate(position, current_price, fresh_signal, now)
    }

    /// Close a position at the current time.
    pub fn close_position(&mut self, id: Uuid, price: f64, reason: ExitReason) -> Result<f64> {
        self.close_position_at(id, price, reason, Utc::now())
    }

    /// Close a position with an explicit exit time. Returns realized P&L.
    pub fn close_position_at(
        &mut self,
        id: Uuid,
        price: f64,
        reason: ExitReason,
        time: DateTime<Utc>,
    ) -> Result<f64> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow::anyhow!("Position {} not found", id))?;

        if position.status == PositionStatus::Closed {
            bail!("Position {} already closed", id);
        }

        let pnl = (price - position.entry_price) * position.quantity;
        position.status = PositionStatus::Closed;
        position.exit_price = Some(price);
        position.exit_time = Some(time);
        position.exit_reason = Some(reason);
        position.realized_pnl = Some(pnl);
        self.cash += price * position.quantity;

        info!(
            "📉 Closed {} @ {:.2} ({:?}, pnl {:+.2})",
            position.symbol, price, reason, pnl
        );
        Ok(pnl)
    }

    /// Run exit checks for every open position that has a price in
    /// `prices`, then close whatever tripped. Two phases so the scan
    /// never mutates while iterating. Returns the closed positions.
    ///
    /// Symbols absent from `prices` (quote fetch failed upstream) are
    /// skipped entirely. Symbols absent from `signals` are treated as
    /// Hold, so only price and time triggers can fire for them.
    pub fn check_exits_at(
        &mut self,
        prices: &HashMap<String, f64>,
        signals: &HashMap<String, Signal>,
        now: DateTime<Utc>,
    ) -> Vec<Position> {
        let mut to_close = Vec::new();

        for position in self.positions.iter_mut() {
            if position.status != PositionStatus::Open {
                continue;
            }
            let Some(&price) = prices.get(&position.symbol) else {
                continue;
            };

            if price > position.peak_price {
                position.peak_price = price;
            }

            let signal = signals
                .get(&position.symbol)
                .copied()
                .unwrap_or(Signal::Hold);

            if let Some(reason) = self.policy.evaluate(position, price, signal, now) {
                to_close.push((position.id, price, reason));
            }
        }

        let mut closed = Vec::new();
        for (id, price, reason) in to_close {
            if self.close_position_at(id, price, reason, now).is_ok() {
                if let Some(position) = self.positions.iter().find(|p| p.id == id) {
                    closed.push(position.clone());
                }
            }
        }

        closed
    }

    /// Cash plus the marked value of open positions. Open positions with
    /// no quote in `prices` are marked at entry.
    pub fn portfolio_value(&self, prices: &HashMap<String, f64>) -> f64 {
        let open_value: f64 = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| {
                let price = prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                price * p.quantity
            })
            .sum();

        self.cash + open_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn book() -> PositionBook {
        PositionBook::new(100_000.0, ExitPolicy::default())
    }

    fn book_with(policy: ExitPolicy) -> PositionBook {
        PositionBook::new(100_000.0, policy)
    }

    #[test]
    fn test_open_and_close_lifecycle() {
        let mut book = book();

        let id = book
            .open_position("TCS".to_string(), 100.0, 10.0)
            .unwrap();
        assert!(book.has_open_position("TCS"));
        assert_eq!(book.cash(), 99_000.0);

        let pnl = book
            .close_position(id, 110.0, ExitReason::TakeProfit)
            .unwrap();
        assert_eq!(pnl, 100.0);
        assert!(!book.has_open_position("TCS"));
        assert_eq!(book.cash(), 100_100.0);

        let closed = &book.positions()[0];
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_price, Some(110.0));
        assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(closed.realized_pnl, Some(100.0));
    }

    #[test]
    fn test_one_open_position_per_symbol() {
        let mut book = book();

        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        let err = book.open_position("TCS".to_string(), 101.0, 5.0);

        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("Already have"));

        // A different symbol is fine
        assert!(book.open_position("INFY".to_string(), 1500.0, 2.0).is_ok());
        assert_eq!(book.open_position_count(), 2);
    }

    #[test]
    fn test_reentry_allowed_after_close() {
        let mut book = book();

        let id = book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.close_position(id, 95.0, ExitReason::StopLoss).unwrap();

        assert!(book.open_position("TCS".to_string(), 90.0, 5.0).is_ok());
    }

    #[test]
    fn test_close_twice_fails() {
        let mut book = book();

        let id = book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.close_position(id, 105.0, ExitReason::SellSignal)
            .unwrap();

        let err = book.close_position(id, 106.0, ExitReason::SellSignal);
        assert!(err.unwrap_err().to_string().contains("already closed"));
    }

    #[test]
    fn test_insufficient_cash_rejected() {
        let mut book = PositionBook::new(500.0, ExitPolicy::default());

        let err = book.open_position("TCS".to_string(), 100.0, 10.0);
        assert!(err.unwrap_err().to_string().contains("Insufficient cash"));
    }

    #[test]
    fn test_peak_only_ratchets_up() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        book.observe_price("TCS", 112.0);
        book.observe_price("TCS", 108.0);

        assert_eq!(book.get_open_position("TCS").unwrap().peak_price, 112.0);
    }

    #[test]
    fn test_trailing_stop_fires_after_pullback_from_peak() {
        let policy = ExitPolicy {
            take_profit: 50.0,
            stop_loss: 10.0,
            trailing_buffer: 5.0,
            max_hold_days: 30,
        };
        let mut book = book_with(policy);
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.observe_price("TCS", 120.0);

        // 114 is in profit and more than 5 below the 120 peak
        let reason = book.should_exit("TCS", 114.0, Signal::Hold, Utc::now());
        assert_eq!(reason, Some(ExitReason::TrailingStop));
    }

    #[test]
    fn test_trailing_stop_needs_full_buffer() {
        let policy = ExitPolicy {
            take_profit: 50.0,
            stop_loss: 10.0,
            trailing_buffer: 5.0,
            max_hold_days: 30,
        };
        let mut book = book_with(policy);
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.observe_price("TCS", 120.0);

        // Exactly peak minus buffer does not fire
        let reason = book.should_exit("TCS", 115.0, Signal::Hold, Utc::now());
        assert_eq!(reason, None);
    }

    #[test]
    fn test_trailing_stop_suppressed_when_not_in_profit() {
        let policy = ExitPolicy {
            take_profit: 50.0,
            stop_loss: 30.0,
            trailing_buffer: 2.0,
            max_hold_days: 30,
        };
        let mut book = book_with(policy);
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.observe_price("TCS", 110.0);

        // Way below peak but also below entry, so no trailing exit
        let reason = book.should_exit("TCS", 95.0, Signal::Hold, Utc::now());
        assert_eq!(reason, None);
    }

    #[test]
    fn test_take_profit_at_threshold() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        // Default take_profit is 10 rupees per share
        assert_eq!(
            book.should_exit("TCS", 110.0, Signal::Hold, Utc::now()),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            book.should_exit("TCS", 109.99, Signal::Hold, Utc::now()),
            None
        );
    }

    #[test]
    fn test_stop_loss_at_threshold() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        // Default stop_loss is 3 rupees per share
        assert_eq!(
            book.should_exit("TCS", 97.0, Signal::Hold, Utc::now()),
            Some(ExitReason::StopLoss)
        );
        assert_eq!(book.should_exit("TCS", 97.01, Signal::Hold, Utc::now()), None);
    }

    #[test]
    fn test_deep_loss_exits_via_stop_loss() {
        let policy = ExitPolicy {
            take_profit: 50.0,
            stop_loss: 10.0,
            trailing_buffer: 5.0,
            max_hold_days: 30,
        };
        let mut book = book_with(policy);
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        let reason = book.should_exit("TCS", 80.0, Signal::Hold, Utc::now());
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_fresh_sell_signal_exits() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        let reason = book.should_exit("TCS", 101.0, Signal::Sell, Utc::now());
        assert_eq!(reason, Some(ExitReason::SellSignal));
    }

    #[test]
    fn test_price_triggers_outrank_sell_signal() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        // Take profit fires first even when the scan also said sell
        let reason = book.should_exit("TCS", 112.0, Signal::Sell, Utc::now());
        assert_eq!(reason, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_max_hold_days() {
        let policy = ExitPolicy {
            max_hold_days: 3,
            ..Default::default()
        };
        let mut book = book_with(policy);

        let opened = Utc::now() - Duration::days(5);
        book.open_position_at("TCS".to_string(), 100.0, 5.0, opened)
            .unwrap();

        let reason = book.should_exit("TCS", 100.5, Signal::Hold, Utc::now());
        assert_eq!(reason, Some(ExitReason::MaxHold));
    }

    #[test]
    fn test_under_max_hold_stays_open() {
        let mut book = book();

        let opened = Utc::now() - Duration::days(4);
        book.open_position_at("TCS".to_string(), 100.0, 5.0, opened)
            .unwrap();

        // Default max_hold_days is 5
        let reason = book.should_exit("TCS", 100.5, Signal::Hold, Utc::now());
        assert_eq!(reason, None);
    }

    #[test]
    fn test_check_exits_closes_tripped_and_skips_missing_prices() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();
        book.open_position("INFY".to_string(), 1500.0, 2.0).unwrap();
        book.open_position("SBIN".to_string(), 600.0, 8.0).unwrap();

        let mut prices = HashMap::new();
        prices.insert("TCS".to_string(), 96.0); // stop loss
        prices.insert("INFY".to_string(), 1501.0); // no trigger
        // SBIN has no quote this round

        let closed = book.check_exits_at(&prices, &HashMap::new(), Utc::now());

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].symbol, "TCS");
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        assert!(book.has_open_position("INFY"));
        assert!(book.has_open_position("SBIN"));
    }

    #[test]
    fn test_check_exits_applies_fresh_signals() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        let mut prices = HashMap::new();
        prices.insert("TCS".to_string(), 101.0);
        let mut signals = HashMap::new();
        signals.insert("TCS".to_string(), Signal::Sell);

        let closed = book.check_exits_at(&prices, &signals, Utc::now());

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::SellSignal));
    }

    #[test]
    fn test_check_exits_ratchets_peak_before_evaluating() {
        let policy = ExitPolicy {
            take_profit: 50.0,
            stop_loss: 10.0,
            trailing_buffer: 5.0,
            max_hold_days: 30,
        };
        let mut book = book_with(policy);
        book.open_position("TCS".to_string(), 100.0, 5.0).unwrap();

        // New high never trips the trailing stop on the same tick
        let mut prices = HashMap::new();
        prices.insert("TCS".to_string(), 120.0);
        let closed = book.check_exits_at(&prices, &HashMap::new(), Utc::now());

        assert!(closed.is_empty());
        assert_eq!(book.get_open_position("TCS").unwrap().peak_price, 120.0);
    }

    #[test]
    fn test_portfolio_value_marks_open_positions() {
        let mut book = book();
        book.open_position("TCS".to_string(), 100.0, 10.0).unwrap();

        let mut prices = HashMap::new();
        prices.insert("TCS".to_string(), 110.0);

        // 99_000 cash + 1_100 marked
        assert_eq!(book.portfolio_value(&prices), 100_100.0);

        // Without a quote the position marks at entry
        assert_eq!(book.portfolio_value(&HashMap::new()), 100_000.0);
    }
}

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::execution::PositionBook;
use crate::models::{ExitReason, Signal};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Execute { quantity: f64 },
    Skip,
    Close {
        position_id: uuid::Uuid,
        exit_reason: ExitReason,
    },
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Turns an aggregated signal into an order decision against the book.
///
/// Buys are sized as whole shares from a fixed per-trade capital slice.
/// Sells and holds route through the exit policy, so a sell signal can
/// still surface as a take-profit or trailing-stop close when a price
/// trigger outranks it.
pub struct Executor {
    book: Arc<Mutex<PositionBook>>,
    per_trade_capital: f64,
    max_open_positions: usize,
}

impl Executor {
    pub fn new(
        book: Arc<Mutex<PositionBook>>,
        per_trade_capital: f64,
        max_open_positions: usize,
    ) -> Self {
        Self {
            book,
            per_trade_capital,
            max_open_positions,
        }
    }

    /// Decide what to do with a fresh signal for one symbol.
    pub fn process_signal(
        &self,
        signal: Signal,
        symbol: &str,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> ExecutionDecision {
        let mut book = self.book.lock().unwrap();

        match signal {
            Signal::Buy => {
                if book.has_open_position(symbol) {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "Already have open position".to_string(),
                    };
                }

                if book.open_position_count() >= self.max_open_positions {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: format!(
                            "Position limit reached ({} open)",
                            self.max_open_positions
                        ),
                    };
                }

                let quantity = (self.per_trade_capital / current_price).floor();
                if quantity < 1.0 {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: format!(
                            "Share price {:.2} above per-trade capital {:.2}",
                            current_price, self.per_trade_capital
                        ),
                    };
                }

                if quantity * current_price > book.cash() {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "Insufficient cash".to_string(),
                    };
                }

                ExecutionDecision {
                    action: ExecutionAction::Execute { quantity },
                    reason: "Buy signal with available capital".to_string(),
                }
            }

            Signal::Sell | Signal::Hold => {
                if book.has_open_position(symbol) {
                    book.observe_price(symbol, current_price);

                    if let Some(exit_reason) =
                        book.should_exit(symbol, current_price, signal, now)
                    {
                        let position_id = book
                            .get_open_position(symbol)
                            .map(|p| p.id)
                            .unwrap_or_default();
                        return ExecutionDecision {
                            action: ExecutionAction::Close {
                                position_id,
                                exit_reason,
                            },
                            reason: format!("Exit trigger: {:?}", exit_reason),
                        };
                    }

                    ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "No exit trigger".to_string(),
                    }
                } else if signal == Signal::Sell {
                    ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "No position to sell".to_string(),
                    }
                } else {
                    ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "Hold signal".to_string(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExitPolicy, PositionBook};

    fn test_executor(per_trade: f64, max_open: usize) -> (Executor, Arc<Mutex<PositionBook>>) {
        let book = Arc::new(Mutex::new(PositionBook::new(
            100_000.0,
            ExitPolicy::default(),
        )));
        (Executor::new(book.clone(), per_trade, max_open), book)
    }

    #[test]
    fn test_buy_sizes_whole_shares() {
        let (executor, _) = test_executor(5000.0, 5);

        let decision = executor.process_signal(Signal::Buy, "TCS", 300.0, Utc::now());

        // 5000 / 300 = 16.67, floored to 16
        assert_eq!(
            decision.action,
            ExecutionAction::Execute { quantity: 16.0 }
        );
    }

    #[test]
    fn test_buy_skipped_when_price_exceeds_slice() {
        let (executor, _) = test_executor(5000.0, 5);

        let decision = executor.process_signal(Signal::Buy, "MRF", 120_000.0, Utc::now());

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("per-trade capital"));
    }

    #[test]
    fn test_skip_buy_when_already_positioned() {
        let (executor, book) = test_executor(5000.0, 5);
        book.lock()
            .unwrap()
            .open_position("TCS".to_string(), 300.0, 10.0)
            .unwrap();

        let decision = executor.process_signal(Signal::Buy, "TCS", 305.0, Utc::now());

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("Already have"));
    }

    #[test]
    fn test_skip_buy_at_position_limit() {
        let (executor, book) = test_executor(5000.0, 2);
        {
            let mut book = book.lock().unwrap();
            book.open_position("TCS".to_string(), 300.0, 5.0).unwrap();
            book.open_position("INFY".to_string(), 1500.0, 2.0).unwrap();
        }

        let decision = executor.process_signal(Signal::Buy, "SBIN", 600.0, Utc::now());

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("Position limit"));
    }

    #[test]
    fn test_skip_sell_when_no_position() {
        let (executor, _) = test_executor(5000.0, 5);

        let decision = executor.process_signal(Signal::Sell, "TCS", 300.0, Utc::now());

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("No position"));
    }

    #[test]
    fn test_sell_signal_closes_position() {
        let (executor, book) = test_executor(5000.0, 5);
        let id = book
            .lock()
            .unwrap()
            .open_position("TCS".to_string(), 300.0, 10.0)
            .unwrap();

        let decision = executor.process_signal(Signal::Sell, "TCS", 301.0, Utc::now());

        assert_eq!(
            decision.action,
            ExecutionAction::Close {
                position_id: id,
                exit_reason: ExitReason::SellSignal,
            }
        );
    }

    #[test]
    fn test_price_trigger_outranks_sell_signal() {
        let (executor, book) = test_executor(5000.0, 5);
        book.lock()
            .unwrap()
            .open_position("TCS".to_string(), 300.0, 10.0)
            .unwrap();

        // Default take_profit is 10 per share; 312 is 12 in profit
        let decision = executor.process_signal(Signal::Sell, "TCS", 312.0, Utc::now());

        assert!(matches!(
            decision.action,
            ExecutionAction::Close {
                exit_reason: ExitReason::TakeProfit,
                ..
            }
        ));
    }

    #[test]
    fn test_hold_still_fires_price_exits() {
        let (executor, book) = test_executor(5000.0, 5);
        book.lock()
            .unwrap()
            .open_position("TCS".to_string(), 300.0, 10.0)
            .unwrap();

        // Default stop_loss is 3 per share
        let decision = executor.process_signal(Signal::Hold, "TCS", 296.0, Utc::now());

        assert!(matches!(
            decision.action,
            ExecutionAction::Close {
                exit_reason: ExitReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn test_hold_with_no_trigger_skips() {
        let (executor, book) = test_executor(5000.0, 5);
        book.lock()
            .unwrap()
            .open_position("TCS".to_string(), 300.0, 10.0)
            .unwrap();

        let decision = executor.process_signal(Signal::Hold, "TCS", 301.0, Utc::now());

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("No exit trigger"));
    }

    #[test]
    fn test_full_trade_cycle() {
        let (executor, book) = test_executor(5000.0, 5);
        let now = Utc::now();

        // Buy signal executes
        let decision = executor.process_signal(Signal::Buy, "TCS", 250.0, now);
        let quantity = match decision.action {
            ExecutionAction::Execute { quantity } => quantity,
            other => panic!("expected Execute, got {:?}", other),
        };
        assert_eq!(quantity, 20.0);

        book.lock()
            .unwrap()
            .open_position("TCS".to_string(), 250.0, quantity)
            .unwrap();

        // Second buy skips
        let decision = executor.process_signal(Signal::Buy, "TCS", 252.0, now);
        assert_eq!(decision.action, ExecutionAction::Skip);

        // Sell closes
        let decision = executor.process_signal(Signal::Sell, "TCS", 253.0, now);
        let (position_id, exit_reason) = match decision.action {
            ExecutionAction::Close {
                position_id,
                exit_reason,
            } => (position_id, exit_reason),
            other => panic!("expected Close, got {:?}", other),
        };
        book.lock()
            .unwrap()
            .close_position(position_id, 253.0, exit_reason)
            .unwrap();

        // Sell again has nothing left to close
        let decision = executor.process_signal(Signal::Sell, "TCS", 253.0, now);
        assert_eq!(decision.action, ExecutionAction::Skip);

        // Re-entry works
        let decision = executor.process_signal(Signal::Buy, "TCS", 250.0, now);
        assert!(matches!(decision.action, ExecutionAction::Execute { .. }));
    }
}

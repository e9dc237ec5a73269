pub mod market_hours;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::execution::{ExecutionAction, ExecutionDecision, Executor, PositionBook};
use crate::market::{CandleBuilder, MarketData};
use crate::models::{Interval, Signal, Tick};
use crate::persistence::{BookState, HoldingsStore};
use crate::strategy::SignalEngine;

const TICK_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Engine
// ============================================================================

/// Live trading engine. Three loops share the book:
///
/// - quote poll: fetches LTPs during the session and feeds them into the
///   tick channel
/// - tick consumer: folds ticks into intraday candles, ratchets peaks,
///   fires price and time exits between scans
/// - scan: on interval boundaries, evaluates full signals per symbol and
///   turns them into entries and exits
pub struct TradeEngine {
    market: Arc<dyn MarketData>,
    signals: SignalEngine,
    book: Arc<Mutex<PositionBook>>,
    executor: Executor,
    store: Arc<HoldingsStore>,
    candles: CandleBuilder,
    watchlist: Vec<String>,
    quote_poll_seconds: u64,
    scan_interval_minutes: u32,
    history_bars: usize,
    max_new_per_scan: usize,
}

impl TradeEngine {
    pub fn new(
        settings: &Settings,
        market: Arc<dyn MarketData>,
        signals: SignalEngine,
        book: Arc<Mutex<PositionBook>>,
        store: HoldingsStore,
    ) -> Self {
        let executor = Executor::new(
            book.clone(),
            settings.trading.per_trade_capital,
            settings.trading.max_open_positions,
        );

        Self {
            market,
            signals,
            book,
            executor,
            store: Arc::new(store),
            candles: CandleBuilder::new(Interval::OneMinute, settings.engine.candle_window),
            watchlist: settings.symbols(),
            quote_poll_seconds: settings.engine.quote_poll_seconds,
            scan_interval_minutes: settings.engine.scan_interval_minutes,
            history_bars: settings.engine.history_bars,
            max_new_per_scan: settings.trading.max_new_positions_per_scan,
        }
    }

    /// Run until Ctrl+C or a loop dies. The book is saved on the way out.
    pub async fn run(self) -> Result<()> {
        if self.watchlist.is_empty() {
            warn!("⚠ Watchlist is empty, nothing to trade");
        }

        info!("🔄 Spawning engine loops...");

        let (tick_tx, tick_rx) = mpsc::channel::<Tick>(TICK_CHANNEL_CAPACITY);

        let quote_task = {
            let market = self.market.clone();
            let watchlist = self.watchlist.clone();
            let candles = self.candles.clone();
            let poll_seconds = self.quote_poll_seconds;
            tokio::spawn(async move {
                quote_poll_loop(market, watchlist, poll_seconds, tick_tx, candles).await;
            })
        };

        let tick_task = {
            let candles = self.candles.clone();
            let book = self.book.clone();
            let store = self.store.clone();
            tokio::spawn(async move {
                tick_loop(tick_rx, candles, book, store).await;
            })
        };

        let book = self.book.clone();
        let store = self.store.clone();
        let scan_interval = self.scan_interval_minutes;
        let ctx = ScanContext {
            market: self.market,
            signals: self.signals,
            executor: self.executor,
            book: self.book,
            store: self.store,
            candles: self.candles,
            watchlist: self.watchlist,
            history_bars: self.history_bars,
            max_new_per_scan: self.max_new_per_scan,
        };
        let scan_task = tokio::spawn(async move {
            scan_loop(ctx, scan_interval).await;
        });

        info!("✅ All loops spawned");
        info!("  🔄 Quote poll: every {}s during session", self.quote_poll_seconds);
        info!("  💹 Signal scan: every {} min (clock-aligned)", scan_interval);
        info!("\nPress Ctrl+C to stop...\n");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("⚠ Received Ctrl+C, shutting down...");
            }
            result = quote_task => {
                error!("Quote poll loop exited: {:?}", result);
            }
            result = tick_task => {
                error!("Tick consumer exited: {:?}", result);
            }
            result = scan_task => {
                error!("Scan loop exited: {:?}", result);
            }
        }

        persist_book(&book, &store);
        info!("👋 Engine stopped");
        Ok(())
    }
}

// ============================================================================
// Scan Pass
// ============================================================================

/// Everything one scan pass needs. Bundled so the pass itself stays a
/// plain function of (context, time) and can run outside the loop.
pub struct ScanContext {
    pub market: Arc<dyn MarketData>,
    pub signals: SignalEngine,
    pub executor: Executor,
    pub book: Arc<Mutex<PositionBook>>,
    pub store: Arc<HoldingsStore>,
    pub candles: CandleBuilder,
    pub watchlist: Vec<String>,
    pub history_bars: usize,
    pub max_new_per_scan: usize,
}

/// Buy decision waiting for an entry slot at the end of a scan pass
struct BuyCandidate {
    symbol: String,
    price: f64,
    buy_votes: usize,
}

/// Strongest vote first; ties keep watchlist order.
fn rank_candidates(mut candidates: Vec<BuyCandidate>) -> Vec<BuyCandidate> {
    candidates.sort_by(|a, b| b.buy_votes.cmp(&a.buy_votes));
    candidates
}

impl ScanContext {
    /// Evaluate every watched symbol once: close whatever trips an exit,
    /// then fill the per-scan entry cap with the strongest Buy candidates.
    /// Returns how many positions were opened.
    pub async fn run_scan_pass(&self, now: DateTime<Utc>) -> usize {
        let mut new_entries = 0usize;
        let mut candidates = Vec::new();

        for symbol in &self.watchlist {
            let series = match self
                .market
                .get_price_series(symbol, Interval::OneDay, self.history_bars)
                .await
            {
                Ok(series) => series,
                Err(e) => {
                    warn!("  ✗ {} history unavailable: {}", symbol, e);
                    continue;
                }
            };

            let decision = self.signals.evaluate(symbol, &series).await;
            info!(
                "  {} → {:?} (buy {} / sell {})",
                symbol, decision.signal, decision.tally.buy_count, decision.tally.sell_count
            );

            // A quote we cannot fetch means no entry and, above all, no
            // exit for this symbol this pass.
            let price = match self.market.get_quote(symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("  ✗ {} quote unavailable, taking no action: {}", symbol, e);
                    continue;
                }
            };

            // Entries wait until every symbol has been scored; exits
            // apply immediately.
            if decision.signal == Signal::Buy {
                candidates.push(BuyCandidate {
                    symbol: symbol.clone(),
                    price,
                    buy_votes: decision.tally.buy_count,
                });
                continue;
            }

            let exec = self
                .executor
                .process_signal(decision.signal, symbol, price, now);
            self.apply_execution(symbol, price, exec, now);
        }

        for candidate in rank_candidates(candidates) {
            if new_entries >= self.max_new_per_scan {
                info!(
                    "  → Entry cap reached this scan, skipping {}",
                    candidate.symbol
                );
                continue;
            }

            let exec = self.executor.process_signal(
                Signal::Buy,
                &candidate.symbol,
                candidate.price,
                now,
            );
            if self.apply_execution(&candidate.symbol, candidate.price, exec, now) {
                new_entries += 1;
            }
        }

        self.log_portfolio_summary();
        new_entries
    }

    /// Carry out one execution decision against the book. Returns true
    /// when a position was opened.
    fn apply_execution(
        &self,
        symbol: &str,
        price: f64,
        exec: ExecutionDecision,
        now: DateTime<Utc>,
    ) -> bool {
        match exec.action {
            ExecutionAction::Execute { quantity } => {
                let opened = {
                    let mut book = self.book.lock().unwrap();
                    book.open_position_at(symbol.to_string(), price, quantity, now)
                };
                match opened {
                    Ok(_) => {
                        persist_book(&self.book, &self.store);
                        true
                    }
                    Err(e) => {
                        error!("  ✗ Failed to open {}: {}", symbol, e);
                        false
                    }
                }
            }
            ExecutionAction::Close {
                position_id,
                exit_reason,
            } => {
                let closed = {
                    let mut book = self.book.lock().unwrap();
                    book.close_position_at(position_id, price, exit_reason, now)
                };
                match closed {
                    Ok(_) => persist_book(&self.book, &self.store),
                    Err(e) => error!("  ✗ Failed to close {}: {}", symbol, e),
                }
                false
            }
            ExecutionAction::Skip => {
                debug!("  → {}: {}", symbol, exec.reason);
                false
            }
        }
    }

    /// Mark open positions at the latest intraday close we built from
    /// ticks; symbols with no candles yet mark at entry.
    fn log_portfolio_summary(&self) {
        let mut marks = HashMap::new();
        for symbol in &self.watchlist {
            if let Some(candle) = self.candles.recent(symbol, 1).first() {
                marks.insert(symbol.clone(), candle.close);
            }
        }

        let book = self.book.lock().unwrap();
        let value = book.portfolio_value(&marks);
        let open = book.open_positions();

        info!("📊 Portfolio: {:.2} ({} open, {:.2} cash)", value, open.len(), book.cash());
        for position in open {
            let mark = marks
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.entry_price);
            info!(
                "    {} | entry {:.2} | mark {:.2} | P&L {:+.2}",
                position.symbol,
                position.entry_price,
                mark,
                position.profit_per_share(mark) * position.quantity
            );
        }
    }
}

// ============================================================================
// Loop Tasks
// ============================================================================

/// Fetch LTPs for the watchlist during the session and feed the tick
/// channel. Sleeps through closed hours and clears the intraday candle
/// windows when a new session opens.
async fn quote_poll_loop(
    market: Arc<dyn MarketData>,
    watchlist: Vec<String>,
    poll_seconds: u64,
    tick_tx: mpsc::Sender<Tick>,
    candles: CandleBuilder,
) {
    info!("🔄 Quote poll loop starting...");
    let mut in_session = false;

    loop {
        let now = Utc::now();

        if !market_hours::is_market_open(now) {
            if in_session {
                info!("🔔 Session closed");
                in_session = false;
            }

            let reopen = market_hours::next_session_open(now);
            let wait = (reopen - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            info!("⏸ Market closed, sleeping until next open ({})", reopen);
            tokio::time::sleep(wait).await;
            continue;
        }

        if !in_session {
            info!("🔔 Session open");
            candles.clear_all();
            in_session = true;
        }

        for symbol in &watchlist {
            match market.get_quote(symbol).await {
                Ok(ltp) => {
                    let tick = Tick {
                        symbol: symbol.clone(),
                        ltp,
                        timestamp: Utc::now(),
                    };
                    if tick_tx.send(tick).await.is_err() {
                        info!("Tick channel closed, quote poll loop stopping");
                        return;
                    }
                }
                Err(e) => {
                    warn!("  ✗ {} quote failed: {}", symbol, e);
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(poll_seconds)).await;
    }
}

/// Consume ticks: build intraday candles, ratchet peaks, and fire price
/// and time exits between scans. Fresh sell signals only exist at scan
/// time, so exits here always evaluate against Hold.
async fn tick_loop(
    mut tick_rx: mpsc::Receiver<Tick>,
    candles: CandleBuilder,
    book: Arc<Mutex<PositionBook>>,
    store: Arc<HoldingsStore>,
) {
    info!("🔄 Tick consumer starting...");

    while let Some(tick) = tick_rx.recv().await {
        candles.apply_tick(&tick);

        let closed = {
            let mut book = book.lock().unwrap();
            let mut prices = HashMap::new();
            prices.insert(tick.symbol.clone(), tick.ltp);
            book.check_exits_at(&prices, &HashMap::new(), tick.timestamp)
        };

        if !closed.is_empty() {
            for position in &closed {
                if let (Some(reason), Some(price)) = (position.exit_reason, position.exit_price) {
                    info!(
                        "🔔 {} exited on tick ({:?} @ {:.2})",
                        position.symbol, reason, price
                    );
                }
            }
            persist_book(&book, &store);
        }
    }

    info!("Tick channel drained, consumer stopping");
}

/// Full signal scan on clock-aligned interval boundaries, session-gated.
async fn scan_loop(ctx: ScanContext, interval_minutes: u32) {
    info!("💹 Scan loop starting...");

    let start = next_scan_boundary(interval_minutes);
    let mut ticker = interval_at(start, Duration::from_secs(u64::from(interval_minutes) * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let now = Utc::now();

        if !market_hours::is_market_open(now) {
            debug!("Market closed, skipping scan");
            continue;
        }

        info!("💹 [SCAN] Tick at {}", now.format("%H:%M:%S"));
        ctx.run_scan_pass(now).await;
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// When the next scan boundary occurs (XX:00, XX:05, ... for a 5-minute
/// interval).
fn next_scan_boundary(interval_minutes: u32) -> Instant {
    let interval = interval_minutes.max(1);
    let now = Utc::now();
    let current_minute = now.minute();
    let current_second = now.second();

    let minutes_until_next = interval - (current_minute % interval);
    let seconds_until_next = if minutes_until_next == interval && current_second == 0 {
        0
    } else {
        minutes_until_next * 60 - current_second
    };

    Instant::now() + Duration::from_secs(u64::from(seconds_until_next))
}

/// Snapshot the book to disk. Failures are logged and absorbed; a failed
/// save never stops trading.
fn persist_book(book: &Arc<Mutex<PositionBook>>, store: &HoldingsStore) {
    let state = {
        let book = book.lock().unwrap();
        BookState {
            cash: book.cash(),
            positions: book.positions().to_vec(),
        }
    };

    if let Err(e) = store.save(&state) {
        warn!("✗ Failed to save holdings: {}", e);
    }
}

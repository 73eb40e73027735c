//! Per-symbol tick algorithm (spec §4.9).

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Seoul;
use kte_broker::BrokerClient;
use kte_clock::{Clock, HolidayCalendar, MarketHoursClock, MarketStatus};
use kte_config::EngineConfig;
use kte_domain::{idempotency, BarSeries, ExitReason, Money, PendingExit, Position, Side, Symbol};
use kte_events::{Event, EventBus};
use kte_execution::{OrderSynchronizer, SyncResultType};
use kte_risk::RiskManager;
use kte_store::{OrderJournal, PositionStore};
use kte_strategy::{EventCalendar, Signal, SignalType};
use tokio::sync::Mutex;

/// Result of one `SymbolExecutor::tick` call, for logging and tests. Not a
/// typed [`Event`] itself — individual state changes within the tick publish
/// their own events; this is the caller-facing summary of what happened.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    KillSwitchExit,
    MarketClosedNoPosition,
    NoBars,
    InvalidQuote,
    NetworkUnavailable,
    Hold,
    BuySkipped { reason: String },
    BuyFilled { order_no: Option<String>, qty: i64, price: Money },
    BuyPartial { order_no: Option<String>, qty: i64, price: Money },
    BuyFailed { message: String },
    SellSkipped { reason: String },
    SellClosed { order_no: Option<String>, qty: i64, price: Money, realized_pnl: Money, reason: ExitReason },
    SellPartial { order_no: Option<String>, qty: i64, price: Money, realized_pnl: Money, reason: ExitReason },
    SellDeferred { next_retry_at: DateTime<Utc> },
    SellFailed { message: String },
}

/// Dynamic tick pacing (spec §4.9): `NEAR_STOPLOSS_EXECUTION_INTERVAL` once
/// the position's distance to its stop reaches `NEAR_STOPLOSS_THRESHOLD_PCT`,
/// `DEFAULT_EXECUTION_INTERVAL` otherwise, and a slow poll whenever the
/// market isn't OPEN.
pub fn next_tick_interval(status: MarketStatus, near_stop_pct: Option<f64>, cfg: &EngineConfig) -> Duration {
    if status != MarketStatus::Open {
        return Duration::from_secs(cfg.closed_execution_interval_secs.min(300));
    }
    match near_stop_pct {
        Some(pct) if pct >= cfg.near_stoploss_threshold_pct => {
            Duration::from_secs(cfg.near_stoploss_execution_interval_secs.max(15))
        }
        _ => Duration::from_secs(cfg.default_execution_interval_secs.max(15)),
    }
}

/// One instance per run-symbol (spec §4.9 "State held"). The risk manager
/// and event bus are account-wide and shared by reference across every
/// executor; everything else here is this symbol's own state.
pub struct SymbolExecutor<'a, B: BrokerClient, C: Clock, H: HolidayCalendar> {
    symbol: Symbol,
    broker: &'a B,
    market_clock: &'a MarketHoursClock<C, H>,
    position_store: &'a PositionStore,
    journal: &'a OrderJournal,
    risk: &'a Mutex<RiskManager>,
    events: &'a EventBus,
    calendar: &'a EventCalendar,
    position: Option<Position>,
    pending_exit: Option<PendingExit>,
    last_signal_type: Option<SignalType>,
    last_near_stop_pct: Option<f64>,
    last_near_sl_alert_key: Option<String>,
    last_near_tp_alert_key: Option<String>,
    last_market_closed_log_at: Option<DateTime<Utc>>,
}

impl<'a, B: BrokerClient, C: Clock, H: HolidayCalendar> SymbolExecutor<'a, B, C, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        broker: &'a B,
        market_clock: &'a MarketHoursClock<C, H>,
        position_store: &'a PositionStore,
        journal: &'a OrderJournal,
        risk: &'a Mutex<RiskManager>,
        events: &'a EventBus,
        calendar: &'a EventCalendar,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let position = position_store.load(&symbol)?;
        let pending_exit = position_store.load_pending_exit(&symbol, now)?;
        Ok(SymbolExecutor {
            symbol,
            broker,
            market_clock,
            position_store,
            journal,
            risk,
            events,
            calendar,
            position,
            pending_exit,
            last_signal_type: None,
            last_near_stop_pct: None,
            last_near_sl_alert_key: None,
            last_near_tp_alert_key: None,
            last_market_closed_log_at: None,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// The most recent tick's distance-to-stop, for the scheduler's
    /// next-wakeup pacing (spec §4.9/§4.11) — `None` before the first tick or
    /// whenever the symbol is flat.
    pub fn last_near_stop_pct(&self) -> Option<f64> {
        self.last_near_stop_pct
    }

    /// The locally-held position, if any — used to re-flush to the store on
    /// shutdown (spec §4.11) without re-deriving it from disk.
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    fn order_quantity(&self, cfg: &EngineConfig) -> i64 {
        cfg.symbol_order_quantity
            .get(self.symbol.as_str())
            .copied()
            .unwrap_or(cfg.order_quantity) as i64
    }

    fn log_market_closed_rate_limited(&mut self, reason: &str, now: DateTime<Utc>) {
        let should_log = match self.last_market_closed_log_at {
            Some(last) => now.signed_duration_since(last) >= chrono::Duration::minutes(5),
            None => true,
        };
        if should_log {
            tracing::info!(symbol = %self.symbol, reason, "market not tradeable; skipping tick");
            self.last_market_closed_log_at = Some(now);
        }
    }

    /// Runs the spec §4.9 tick algorithm once. `allow_new_entries` is
    /// supplied by the scheduler, folding together the universe's
    /// `max_positions` gate and reconcile's per-symbol block flag.
    pub async fn tick(&mut self, cfg: &EngineConfig, allow_new_entries: bool, now: DateTime<Utc>) -> TickOutcome {
        let kst_today = now.with_timezone(&Seoul).date_naive();

        // 1. Refresh risk account snapshot.
        match self.broker.get_account_balance().await {
            Ok(balance) => {
                let mut risk = self.risk.lock().await;
                risk.update_account_snapshot(balance.total_equity, kst_today, now, cfg);
            }
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "account snapshot refresh failed");
            }
        }

        // 2. Kill switch.
        let kill_check = { self.risk.lock().await.check_kill_switch() };
        if kill_check.should_exit {
            if let Some(position) = &self.position {
                if let Err(e) = self.position_store.save(&self.symbol, position, now) {
                    tracing::error!(symbol = %self.symbol, error = %e, "failed to persist position on kill-switch exit");
                }
            }
            self.events.publish(Event::KillSwitchTripped {
                reason: kill_check.reason.unwrap_or_default(),
                at: now,
            });
            return TickOutcome::KillSwitchExit;
        }

        // 3. Market-hours skip when flat.
        if self.position.is_none() {
            let (tradeable, reason) = self.market_clock.tradeable(false);
            if !tradeable {
                self.log_market_closed_rate_limited(reason, now);
                return TickOutcome::MarketClosedNoPosition;
            }
        }

        // 4. Bars.
        let raw_bars = match self.broker.get_daily_ohlcv(&self.symbol, None, None).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "failed to fetch daily bars");
                return TickOutcome::NoBars;
            }
        };
        if raw_bars.is_empty() {
            return TickOutcome::NoBars;
        }
        let bars = BarSeries::from_unordered(raw_bars);

        // 5. Quote.
        let quote = match self.broker.get_current_price(&self.symbol).await {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, error = %e, "failed to fetch current price");
                return TickOutcome::InvalidQuote;
            }
        };
        if quote.price.as_f64() <= 0.0 || quote.open.as_f64() <= 0.0 {
            return TickOutcome::InvalidQuote;
        }

        // 6. Network health.
        if self.broker.network_unavailable() {
            self.events.publish(Event::NetworkUnavailable { since: now, outage_secs: 60 });
            return TickOutcome::NetworkUnavailable;
        }

        // 7. Strategy.
        let signal = kte_strategy::evaluate(
            &bars,
            quote.price,
            Some(quote.open),
            self.position.as_mut(),
            cfg,
            self.calendar,
            kst_today,
        );
        self.events.publish(Event::SignalComputed {
            symbol: self.symbol.clone(),
            signal: signal.clone(),
        });
        self.last_signal_type = Some(signal.signal_type);
        self.last_near_stop_pct = signal.near_stop_pct;

        // 8. Dispatch.
        match signal.signal_type {
            SignalType::Buy => self.dispatch_buy(cfg, &signal, allow_new_entries, now).await,
            SignalType::Sell => self.dispatch_sell(cfg, &signal, now).await,
            SignalType::Hold => {
                self.evaluate_near_threshold_alerts(cfg, &signal);
                TickOutcome::Hold
            }
        }
    }

    async fn dispatch_buy(&mut self, cfg: &EngineConfig, signal: &Signal, allow_new_entries: bool, now: DateTime<Utc>) -> TickOutcome {
        if !allow_new_entries {
            tracing::info!(symbol = %self.symbol, "BUY signal but new entries are gated off; skipping");
            return TickOutcome::BuySkipped {
                reason: "new entries gated off (universe/reconcile)".to_string(),
            };
        }
        let risk_check = { self.risk.lock().await.check_order_allowed(false, cfg) };
        if !risk_check.passed {
            let reason = risk_check.reason.clone().unwrap_or_default();
            self.events.publish(Event::RiskCheckFailed {
                symbol: Some(self.symbol.clone()),
                check: risk_check,
            });
            return TickOutcome::BuySkipped { reason };
        }

        let qty = self.order_quantity(cfg);
        if qty <= 0 {
            return TickOutcome::BuySkipped { reason: "configured order quantity is zero".to_string() };
        }

        let signal_id = idempotency::signal_id(&self.symbol, Side::Buy, signal.price.minor(), now);
        self.events.publish(Event::OrderRequested {
            symbol: self.symbol.clone(),
            side: Side::Buy,
            qty,
            signal_id: signal_id.clone(),
        });

        let synchronizer = OrderSynchronizer::new(
            self.broker,
            self.journal,
            cfg.execution_mode,
            Duration::from_secs(cfg.order_execution_timeout_secs),
            Duration::from_secs(cfg.order_check_interval_secs),
            cfg.emergency_timeout_multiplier as u32,
        );
        let result = synchronizer
            .execute(
                self.market_clock,
                Side::Buy,
                &self.symbol,
                qty,
                &signal_id,
                signal.price.minor(),
                false,
                false,
                now,
            )
            .await;

        match result.result_type {
            SyncResultType::Success | SyncResultType::Partial if result.exec_qty > 0 => {
                if let Some(order_no) = &result.order_no {
                    self.events.publish(Event::OrderSubmitted {
                        symbol: self.symbol.clone(),
                        order_no: order_no.clone(),
                    });
                }
                let exec_qty = result.exec_qty as i64;
                match &mut self.position {
                    Some(position) => position.scale_in(result.exec_price, exec_qty),
                    None => {
                        let stop_loss = signal.stop_loss.unwrap_or(result.exec_price);
                        let atr = Money::from_f64_quantized(signal.atr.unwrap_or(0.0));
                        match Position::new(
                            self.symbol.clone(),
                            result.exec_price,
                            exec_qty,
                            now.with_timezone(&Seoul).date_naive(),
                            stop_loss,
                            signal.take_profit,
                            atr,
                        ) {
                            Ok(position) => self.position = Some(position),
                            Err(e) => {
                                tracing::error!(symbol = %self.symbol, ?e, "filled BUY violates position invariants; not recording locally");
                                return TickOutcome::BuyFailed {
                                    message: format!("position invariant violated: {e:?}"),
                                };
                            }
                        }
                    }
                }
                if let Some(position) = &self.position {
                    if let Err(e) = self.position_store.save(&self.symbol, position, now) {
                        tracing::error!(symbol = %self.symbol, error = %e, "failed to persist position after BUY fill");
                    }
                    self.events.publish(Event::PositionOpened {
                        symbol: self.symbol.clone(),
                        entry_price: position.entry_price,
                        quantity: position.quantity,
                    });
                }
                self.events.publish(Event::OrderFilled {
                    symbol: self.symbol.clone(),
                    order_no: result.order_no.clone().unwrap_or_default(),
                    qty: exec_qty,
                    price: result.exec_price,
                });
                if result.result_type == SyncResultType::Success {
                    TickOutcome::BuyFilled { order_no: result.order_no, qty: exec_qty, price: result.exec_price }
                } else {
                    TickOutcome::BuyPartial { order_no: result.order_no, qty: exec_qty, price: result.exec_price }
                }
            }
            _ => TickOutcome::BuyFailed { message: result.message },
        }
    }

    async fn dispatch_sell(&mut self, cfg: &EngineConfig, signal: &Signal, now: DateTime<Utc>) -> TickOutcome {
        let Some(reason) = signal.exit_reason else {
            return TickOutcome::SellFailed { message: "sell signal carried no exit reason".to_string() };
        };
        let reason_code = signal.reason_code.clone().unwrap_or_default();

        if let Some(pending) = &self.pending_exit {
            if pending.symbol == self.symbol && pending.exit_reason == reason && !pending.is_due(now) {
                return TickOutcome::SellSkipped { reason: "pending-exit backoff not yet elapsed".to_string() };
            }
        }

        let Some(position) = &self.position else {
            return TickOutcome::SellFailed { message: "sell signal with no open position".to_string() };
        };
        let qty = position.quantity;
        let is_emergency = reason.is_emergency();
        let signal_id = idempotency::signal_id(&self.symbol, Side::Sell, signal.price.minor(), now);

        self.events.publish(Event::OrderRequested {
            symbol: self.symbol.clone(),
            side: Side::Sell,
            qty,
            signal_id: signal_id.clone(),
        });

        let synchronizer = OrderSynchronizer::new(
            self.broker,
            self.journal,
            cfg.execution_mode,
            Duration::from_secs(cfg.order_execution_timeout_secs),
            Duration::from_secs(cfg.order_check_interval_secs),
            cfg.emergency_timeout_multiplier as u32,
        );
        let result = synchronizer
            .execute(
                self.market_clock,
                Side::Sell,
                &self.symbol,
                qty,
                &signal_id,
                signal.price.minor(),
                is_emergency,
                false,
                now,
            )
            .await;

        match result.result_type {
            SyncResultType::Success if result.exec_qty as i64 >= qty => {
                self.close_position(&result.order_no, result.exec_qty as i64, result.exec_price, reason, cfg, now).await
            }
            SyncResultType::Success | SyncResultType::Partial if result.exec_qty > 0 => {
                self.partial_close(&result.order_no, result.exec_qty as i64, result.exec_price, reason, cfg, now).await
            }
            SyncResultType::MarketClosed | SyncResultType::Cancelled | SyncResultType::Failed => {
                let next_retry_at = now + chrono::Duration::minutes(cfg.pending_exit_backoff_minutes);
                let pending = PendingExit::new(self.symbol.clone(), reason, reason_code, next_retry_at, result.message.clone(), now);
                if let Err(e) = self.position_store.save_pending_exit(&pending, now) {
                    tracing::error!(symbol = %self.symbol, error = %e, "failed to persist pending exit");
                }
                self.pending_exit = Some(pending);
                TickOutcome::SellDeferred { next_retry_at }
            }
            _ => TickOutcome::SellFailed { message: result.message },
        }
    }

    async fn close_position(
        &mut self,
        order_no: &Option<String>,
        exec_qty: i64,
        exec_price: Money,
        reason: ExitReason,
        cfg: &EngineConfig,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let Some(position) = self.position.take() else {
            return TickOutcome::SellFailed { message: "no position to close".to_string() };
        };
        let entry_price = position.entry_price;
        let initial_stop = position.stop_loss;
        let realized_pnl = exec_price
            .saturating_sub(entry_price)
            .checked_mul_qty(exec_qty)
            .unwrap_or(Money::ZERO);

        self.risk.lock().await.record_trade_pnl(realized_pnl, cfg, now);
        if let Err(e) = self.position_store.clear(&self.symbol, now) {
            tracing::error!(symbol = %self.symbol, error = %e, "failed to clear closed position from store");
        }
        if self.pending_exit.is_some() {
            if let Err(e) = self.position_store.clear_pending_exit(&self.symbol, now) {
                tracing::error!(symbol = %self.symbol, error = %e, "failed to clear pending exit after close");
            }
            self.pending_exit = None;
        }
        self.events.publish(Event::PositionClosed {
            symbol: self.symbol.clone(),
            entry_price,
            initial_stop,
            exit_price: exec_price,
            quantity: exec_qty,
            realized_pnl,
            reason,
        });
        TickOutcome::SellClosed { order_no: order_no.clone(), qty: exec_qty, price: exec_price, realized_pnl, reason }
    }

    async fn partial_close(
        &mut self,
        order_no: &Option<String>,
        exec_qty: i64,
        exec_price: Money,
        reason: ExitReason,
        cfg: &EngineConfig,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let (realized_pnl, fully_closed) = {
            let position = self.position.as_mut().expect("sell dispatch already checked position is Some");
            let entry_price = position.entry_price;
            let pnl = exec_price.saturating_sub(entry_price).checked_mul_qty(exec_qty).unwrap_or(Money::ZERO);
            let fully_closed = position.reduce_quantity(exec_qty);
            (pnl, fully_closed)
        };
        if fully_closed {
            return self.close_position(order_no, exec_qty, exec_price, reason, cfg, now).await;
        }
        self.risk.lock().await.record_trade_pnl(realized_pnl, cfg, now);
        if let Some(position) = &self.position {
            if let Err(e) = self.position_store.save(&self.symbol, position, now) {
                tracing::error!(symbol = %self.symbol, error = %e, "failed to persist position after partial SELL fill");
            }
        }
        self.events.publish(Event::OrderPartial {
            symbol: self.symbol.clone(),
            order_no: order_no.clone().unwrap_or_default(),
            filled_qty: exec_qty,
            remaining_qty: self.position.as_ref().map(|p| p.quantity).unwrap_or(0),
        });
        TickOutcome::SellPartial { order_no: order_no.clone(), qty: exec_qty, price: exec_price, realized_pnl, reason }
    }

    fn evaluate_near_threshold_alerts(&mut self, cfg: &EngineConfig, signal: &Signal) {
        if let Some(pct) = signal.near_stop_pct {
            if pct >= cfg.alert_near_stoploss_pct {
                let key = format!("SL_{}_{}", self.symbol, pct.trunc() as i64);
                if self.last_near_sl_alert_key.as_deref() != Some(key.as_str()) {
                    tracing::warn!(symbol = %self.symbol, pct, "price approaching stop loss");
                    self.last_near_sl_alert_key = Some(key);
                }
            }
        }
        if let Some(pct) = signal.near_tp_pct {
            if pct >= cfg.alert_near_takeprofit_pct {
                let key = format!("TP_{}_{}", self.symbol, pct.trunc() as i64);
                if self.last_near_tp_alert_key.as_deref() != Some(key.as_str()) {
                    tracing::info!(symbol = %self.symbol, pct, "price approaching take profit");
                    self.last_near_tp_alert_key = Some(key);
                }
            }
        }
    }
}

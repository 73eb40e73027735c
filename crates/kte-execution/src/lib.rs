//! Order synchronizer (C7, spec §4.7): one logical trade = submit +
//! wait-for-fill + apply-or-cancel, idempotent across retries and restarts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kte_broker::{BrokerClient, OrderType, PlaceOrderRequest, WaitOutcome};
use kte_clock::{Clock, HolidayCalendar, MarketHoursClock};
use kte_domain::{idempotency, Mode, OrderState, OrderStatus, Side, Symbol};
use kte_store::OrderJournal;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncResultType {
    Success,
    Partial,
    Cancelled,
    Failed,
    MarketClosed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    pub result_type: SyncResultType,
    pub order_no: Option<String>,
    pub exec_qty: u64,
    pub exec_price: kte_domain::Money,
    pub message: String,
}

impl SyncResult {
    fn market_closed(message: impl Into<String>) -> Self {
        SyncResult {
            success: false,
            result_type: SyncResultType::MarketClosed,
            order_no: None,
            exec_qty: 0,
            exec_price: kte_domain::Money::ZERO,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        SyncResult {
            success: false,
            result_type: SyncResultType::Failed,
            order_no: None,
            exec_qty: 0,
            exec_price: kte_domain::Money::ZERO,
            message: message.into(),
        }
    }
}

pub struct OrderSynchronizer<'a, B: BrokerClient> {
    broker: &'a B,
    journal: &'a OrderJournal,
    mode: Mode,
    order_timeout: Duration,
    poll_interval: Duration,
    emergency_multiplier: u32,
}

impl<'a, B: BrokerClient> OrderSynchronizer<'a, B> {
    pub fn new(
        broker: &'a B,
        journal: &'a OrderJournal,
        mode: Mode,
        order_timeout: Duration,
        poll_interval: Duration,
        emergency_multiplier: u32,
    ) -> Self {
        OrderSynchronizer {
            broker,
            journal,
            mode,
            order_timeout,
            poll_interval,
            emergency_multiplier,
        }
    }

    /// spec §4.7 algorithm steps 1-8.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<C: Clock, H: HolidayCalendar>(
        &self,
        market_clock: &MarketHoursClock<C, H>,
        side: Side,
        symbol: &Symbol,
        qty: i64,
        signal_id: &str,
        price_minor: i64,
        is_emergency: bool,
        skip_market_check: bool,
        now: DateTime<Utc>,
    ) -> SyncResult {
        // 1. Market-hours gate, unless emergency SELL or explicitly skipped.
        let is_emergency_sell = side == Side::Sell && is_emergency;
        if !skip_market_check && !is_emergency_sell {
            let (tradeable, reason) = market_clock.tradeable(false);
            if !tradeable {
                return SyncResult::market_closed(reason);
            }
        } else if is_emergency_sell {
            let (tradeable, reason) = market_clock.tradeable(true);
            if !tradeable {
                return SyncResult::market_closed(reason);
            }
        }

        // 2. Idempotency dedup.
        let key = idempotency::idempotency_key(self.mode, side, symbol, qty, signal_id);
        if let Some(existing) = self.journal.get(&key) {
            if !existing.status.is_terminal() {
                return SyncResult {
                    success: false,
                    result_type: SyncResultType::Failed,
                    order_no: existing.broker_order_no.clone(),
                    exec_qty: existing.filled_qty.max(0) as u64,
                    exec_price: existing.avg_fill_price.unwrap_or(kte_domain::Money::ZERO),
                    message: "duplicate: non-terminal order already in flight".to_string(),
                };
            }
        }
        let order = OrderState::new_pending(key.clone(), signal_id.to_string(), symbol.clone(), side, qty, self.mode, now);
        if let Err(e) = self.journal.insert_pending(order) {
            return SyncResult::failed(format!("journal write failed: {e}"));
        }

        // 3. Submit.
        let req = PlaceOrderRequest {
            side,
            symbol: symbol.clone(),
            quantity: qty as u64,
            price: kte_domain::Money::from_minor(price_minor),
            order_type: OrderType::Market,
        };
        let placed = match self.broker.place_order(req).await {
            Ok(resp) => resp,
            Err(e) => {
                let _ = self.journal.update_with(&key, |row| {
                    let _ = row.transition(OrderStatus::Rejected, now);
                });
                return SyncResult::failed(format!("order placement failed: {e}"));
            }
        };

        // 4. Mark submitted.
        if let Err(e) = self.journal.update_with(&key, |row| {
            row.broker_order_no = Some(placed.order_no.clone());
            let _ = row.transition(OrderStatus::Submitted, now);
        }) {
            return SyncResult::failed(format!("journal write failed: {e}"));
        }

        // 5. Wait for fill, 3x timeout for emergency exits.
        let timeout = if is_emergency {
            self.order_timeout * self.emergency_multiplier
        } else {
            self.order_timeout
        };
        let wait_result = match self
            .broker
            .wait_for_execution(&placed.order_no, qty as u64, timeout, self.poll_interval)
            .await
        {
            Ok(r) => r,
            Err(e) => return SyncResult::failed(format!("wait_for_execution failed: {e}")),
        };

        match wait_result.status {
            WaitOutcome::Filled => {
                let _ = self.journal.update_with(&key, |row| {
                    row.accrue_fill(wait_result.exec_qty as i64, wait_result.exec_price, now);
                    let _ = row.transition(OrderStatus::Filled, now);
                });
                SyncResult {
                    success: true,
                    result_type: SyncResultType::Success,
                    order_no: Some(placed.order_no),
                    exec_qty: wait_result.exec_qty,
                    exec_price: wait_result.exec_price,
                    message: "filled".to_string(),
                }
            }
            WaitOutcome::Partial => {
                let _ = self.journal.update_with(&key, |row| {
                    row.accrue_fill(wait_result.exec_qty as i64, wait_result.exec_price, now);
                    let _ = row.transition(OrderStatus::Partial, now);
                });
                SyncResult {
                    success: true,
                    result_type: SyncResultType::Partial,
                    order_no: Some(placed.order_no),
                    exec_qty: wait_result.exec_qty,
                    exec_price: wait_result.exec_price,
                    message: "partially filled; residual cancelled".to_string(),
                }
            }
            WaitOutcome::Cancelled => {
                let _ = self.journal.update_with(&key, |row| {
                    let _ = row.transition(OrderStatus::Cancelled, now);
                });
                SyncResult {
                    success: false,
                    result_type: SyncResultType::Cancelled,
                    order_no: Some(placed.order_no),
                    exec_qty: 0,
                    exec_price: kte_domain::Money::ZERO,
                    message: "no fill before timeout; order cancelled".to_string(),
                }
            }
        }
    }
}

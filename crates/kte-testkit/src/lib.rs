//! Shared scenario-test support: a frozen-clock KST instant table matching
//! the literal dates `kte-execution`'s own unit tests already use, a bar
//! builder for constant-ATR synthetic series, and [`PartialFillBroker`], an
//! in-memory broker stub that fills a configurable fraction of an order —
//! the one behavior [`kte_broker::paper_stub::PaperStubBroker`] doesn't
//! cover, needed for the partial-fill scenario.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kte_broker::error::BrokerError;
use kte_broker::types::*;
use kte_broker::BrokerClient;
use kte_domain::{Bar, Money, Side, Symbol};

/// 2026-07-20 is a Monday; 10:00 KST = 01:00 UTC, well inside market hours.
pub fn kst_open_instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-07-20T01:00:00Z").unwrap().with_timezone(&Utc)
}

/// 2026-07-20 15:25 KST = 06:25 UTC, the CLOSE_AUCTION window.
pub fn kst_close_auction_instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-07-20T06:25:00Z").unwrap().with_timezone(&Utc)
}

/// 2026-07-21, the next trading day's 10:00 KST open.
pub fn kst_next_open_instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-07-21T01:00:00Z").unwrap().with_timezone(&Utc)
}

/// 2026-07-18 is a Saturday; market is closed all day.
pub fn kst_weekend_instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-07-18T01:00:00Z").unwrap().with_timezone(&Utc)
}

/// Builds `count` daily bars, starting `2026-01-01`, whose true range is a
/// constant `atr` every day and whose close rises by `daily_step` each bar.
/// Because Wilder's ATR of a constant input stays at that same constant from
/// the first warmed-up value onward, this pins `latest_atr` to exactly `atr`
/// without needing to run the indicator to find out what it converges to.
pub fn constant_atr_uptrend(count: usize, start_close: i64, daily_step: i64, atr: i64) -> Vec<Bar> {
    let half_band = atr / 2;
    (0..count)
        .map(|i| {
            let close = start_close + (i as i64) * daily_step;
            Bar {
                date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: Money::from_major(close),
                high: Money::from_major(close + half_band),
                low: Money::from_major(close - half_band),
                close: Money::from_major(close),
                volume: 1_000_000,
            }
        })
        .collect()
}

struct PendingFill {
    side: Side,
    symbol: Symbol,
    ordered_qty: u64,
    filled_qty: u64,
    price: Money,
}

/// Fills exactly `fill_fraction` of every order it receives, cancelling the
/// residual — for exercising the partial-fill path (scenario S4) that
/// [`kte_broker::paper_stub::PaperStubBroker`] always fills in full.
pub struct PartialFillBroker {
    fill_qty_override: Option<u64>,
    prices: Mutex<BTreeMap<Symbol, CurrentPrice>>,
    bars: Mutex<BTreeMap<Symbol, Vec<Bar>>>,
    orders: Mutex<BTreeMap<String, PendingFill>>,
    next_order_no: Mutex<u64>,
}

impl PartialFillBroker {
    /// `fill_qty_override`: the exact quantity every order fills for,
    /// regardless of the quantity requested (residual is cancelled).
    pub fn new(fill_qty_override: u64) -> Self {
        PartialFillBroker {
            fill_qty_override: Some(fill_qty_override),
            prices: Mutex::new(BTreeMap::new()),
            bars: Mutex::new(BTreeMap::new()),
            orders: Mutex::new(BTreeMap::new()),
            next_order_no: Mutex::new(1),
        }
    }

    pub fn set_bars(&self, symbol: Symbol, bars: Vec<Bar>) {
        self.bars.lock().unwrap().insert(symbol, bars);
    }

    pub fn set_current_price(&self, symbol: Symbol, price: CurrentPrice) {
        self.prices.lock().unwrap().insert(symbol, price);
    }
}

#[async_trait]
impl BrokerClient for PartialFillBroker {
    async fn get_access_token(&self) -> Result<AccessToken, BrokerError> {
        Ok(AccessToken { token: "stub".into(), expires_at: Utc::now() + chrono::Duration::hours(24) })
    }

    async fn get_daily_ohlcv(&self, symbol: &Symbol, _from: Option<NaiveDate>, _to: Option<NaiveDate>) -> Result<Vec<Bar>, BrokerError> {
        Ok(self.bars.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn get_current_price(&self, symbol: &Symbol) -> Result<CurrentPrice, BrokerError> {
        self.prices.lock().unwrap().get(symbol).cloned().ok_or_else(|| BrokerError::NotFound(symbol.to_string()))
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerError> {
        let mut next = self.next_order_no.lock().unwrap();
        let order_no = format!("PARTIAL{:08}", *next);
        *next += 1;
        drop(next);

        let fill_price = if req.price.minor() == 0 {
            self.prices.lock().unwrap().get(&req.symbol).map(|p| p.price).unwrap_or(Money::ZERO)
        } else {
            req.price
        };
        let filled_qty = self.fill_qty_override.unwrap_or(req.quantity).min(req.quantity);

        self.orders.lock().unwrap().insert(
            order_no.clone(),
            PendingFill { side: req.side, symbol: req.symbol, ordered_qty: req.quantity, filled_qty, price: fill_price },
        );
        Ok(PlaceOrderResponse { order_no })
    }

    async fn cancel_order(&self, order_no: &str) -> Result<(), BrokerError> {
        self.orders.lock().unwrap().remove(order_no);
        Ok(())
    }

    async fn get_order_status(&self, order_no: Option<&str>) -> Result<Vec<ExecutedOrder>, BrokerError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .iter()
            .filter(|(no, _)| order_no.map(|target| target == no.as_str()).unwrap_or(true))
            .map(|(no, o)| ExecutedOrder {
                order_no: no.clone(),
                side: o.side,
                ordered_qty: o.ordered_qty,
                filled_qty: o.filled_qty,
                avg_price: o.price,
                remaining_qty: o.ordered_qty - o.filled_qty,
                status: if o.filled_qty == 0 {
                    OrderExecutionStatus::Open
                } else if o.filled_qty < o.ordered_qty {
                    OrderExecutionStatus::PartiallyFilled
                } else {
                    OrderExecutionStatus::Filled
                },
            })
            .collect())
    }

    async fn wait_for_execution(
        &self,
        order_no: &str,
        expected_qty: u64,
        timeout: std::time::Duration,
        poll_interval: std::time::Duration,
    ) -> Result<WaitForExecutionResult, BrokerError> {
        kte_broker::poll_until_filled_or_timeout(self, order_no, expected_qty, timeout, poll_interval).await
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, BrokerError> {
        Ok(AccountBalance { holdings: Vec::new(), cash: Money::from_major(10_000_000), total_equity: Money::from_major(10_000_000), total_pnl: Money::ZERO })
    }

    fn mode(&self) -> Mode {
        Mode::Paper
    }
}

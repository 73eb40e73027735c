//! An in-memory broker stub for offline simulation and deterministic tests
//! (grounded on the teacher's `mqk-broker-paper`/`mqk-testkit::paper_broker`
//! pattern): fills immediately at the requested price, tracks positions in a
//! `BTreeMap` keyed by symbol.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kte_domain::{Bar, Money, Side, Symbol};

use crate::error::BrokerError;
use crate::types::*;
use crate::BrokerClient;

struct StubOrder {
    side: Side,
    symbol: Symbol,
    ordered_qty: u64,
    price: Money,
}

pub struct PaperStubBroker {
    mode: Mode,
    bars: Mutex<BTreeMap<Symbol, Vec<Bar>>>,
    prices: Mutex<BTreeMap<Symbol, CurrentPrice>>,
    orders: Mutex<BTreeMap<String, StubOrder>>,
    holdings: Mutex<BTreeMap<Symbol, Holding>>,
    cash: Mutex<Money>,
    next_order_no: Mutex<u64>,
}

impl PaperStubBroker {
    pub fn new(starting_cash: Money) -> Self {
        PaperStubBroker {
            mode: Mode::Paper,
            bars: Mutex::new(BTreeMap::new()),
            prices: Mutex::new(BTreeMap::new()),
            orders: Mutex::new(BTreeMap::new()),
            holdings: Mutex::new(BTreeMap::new()),
            cash: Mutex::new(starting_cash),
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
impl BrokerClient for PaperStubBroker {
    async fn get_access_token(&self) -> Result<AccessToken, BrokerError> {
        Ok(AccessToken {
            token: "stub-token".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(24),
        })
    }

    async fn get_daily_ohlcv(
        &self,
        symbol: &Symbol,
        _from: Option<chrono::NaiveDate>,
        _to: Option<chrono::NaiveDate>,
    ) -> Result<Vec<Bar>, BrokerError> {
        Ok(self.bars.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn get_current_price(&self, symbol: &Symbol) -> Result<CurrentPrice, BrokerError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(symbol.to_string()))
    }

    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerError> {
        let mut next = self.next_order_no.lock().unwrap();
        let order_no = format!("STUB{:08}", *next);
        *next += 1;
        drop(next);

        let fill_price = if req.price.minor() == 0 {
            self.prices
                .lock()
                .unwrap()
                .get(&req.symbol)
                .map(|p| p.price)
                .unwrap_or(Money::ZERO)
        } else {
            req.price
        };

        self.orders.lock().unwrap().insert(
            order_no.clone(),
            StubOrder {
                side: req.side,
                symbol: req.symbol.clone(),
                ordered_qty: req.quantity,
                price: fill_price,
            },
        );

        let mut holdings = self.holdings.lock().unwrap();
        let entry = holdings.entry(req.symbol.clone()).or_insert(Holding {
            symbol: req.symbol.clone(),
            quantity: 0,
            avg_price: fill_price,
            current_price: fill_price,
            pnl: Money::ZERO,
        });
        match req.side {
            Side::Buy => {
                let new_qty = entry.quantity + req.quantity;
                entry.avg_price = Money::weighted_average(
                    entry.avg_price,
                    entry.quantity as i64,
                    fill_price,
                    req.quantity as i64,
                );
                entry.quantity = new_qty;
            }
            Side::Sell => {
                entry.quantity = entry.quantity.saturating_sub(req.quantity);
            }
        }

        Ok(PlaceOrderResponse { order_no })
    }

    async fn cancel_order(&self, order_no: &str) -> Result<(), BrokerError> {
        self.orders.lock().unwrap().remove(order_no);
        Ok(())
    }

    async fn get_order_status(&self, order_no: Option<&str>) -> Result<Vec<ExecutedOrder>, BrokerError> {
        let orders = self.orders.lock().unwrap();
        let matching: Vec<ExecutedOrder> = orders
            .iter()
            .filter(|(no, _)| order_no.map(|target| target == no.as_str()).unwrap_or(true))
            .map(|(no, order)| ExecutedOrder {
                order_no: no.clone(),
                side: order.side,
                ordered_qty: order.ordered_qty,
                filled_qty: order.ordered_qty,
                avg_price: order.price,
                remaining_qty: 0,
                status: OrderExecutionStatus::Filled,
            })
            .collect();
        Ok(matching)
    }

    async fn wait_for_execution(
        &self,
        order_no: &str,
        expected_qty: u64,
        timeout: std::time::Duration,
        poll_interval: std::time::Duration,
    ) -> Result<WaitForExecutionResult, BrokerError> {
        crate::poll_until_filled_or_timeout(self, order_no, expected_qty, timeout, poll_interval).await
    }

    async fn get_account_balance(&self) -> Result<AccountBalance, BrokerError> {
        let holdings: Vec<Holding> = self
            .holdings
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.quantity > 0)
            .cloned()
            .collect();
        let cash = *self.cash.lock().unwrap();
        let total_equity = holdings.iter().fold(cash, |acc, h| {
            acc.saturating_add(h.current_price.checked_mul_qty(h.quantity as i64).unwrap_or(Money::ZERO))
        });
        Ok(AccountBalance {
            holdings,
            cash,
            total_equity,
            total_pnl: Money::ZERO,
        })
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn market_buy_fills_at_current_price() {
        let broker = PaperStubBroker::new(Money::from_major(10_000_000));
        let symbol = Symbol::new("005930");
        broker.set_current_price(
            symbol.clone(),
            CurrentPrice {
                price: Money::from_major(70_000),
                open: Money::from_major(69_500),
                high: Money::from_major(70_500),
                low: Money::from_major(69_000),
                volume: 1_000_000,
                change_rate: 0.5,
            },
        );

        let resp = broker
            .place_order(PlaceOrderRequest {
                side: Side::Buy,
                symbol: symbol.clone(),
                quantity: 10,
                price: Money::ZERO,
                order_type: OrderType::Market,
            })
            .await
            .unwrap();

        let result = broker
            .wait_for_execution(&resp.order_no, 10, Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result.status, WaitOutcome::Filled);
        assert_eq!(result.exec_qty, 10);

        let balance = broker.get_account_balance().await.unwrap();
        assert_eq!(balance.holdings.len(), 1);
        assert_eq!(balance.holdings[0].quantity, 10);
    }

    #[tokio::test]
    async fn unknown_symbol_price_is_not_found() {
        let broker = PaperStubBroker::new(Money::ZERO);
        let err = broker.get_current_price(&Symbol::new("000001")).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }
}

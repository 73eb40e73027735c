//! Broker-agnostic DTOs (spec §4.2, §6), independent of the KIS wire format.

use chrono::{DateTime, Utc};
use kte_domain::{Money, Side, Symbol};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Paper,
    Real,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Renew when `now >= expires_at - 10min` (spec §4.2).
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - chrono::Duration::minutes(10)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OhlcvPeriod {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurrentPrice {
    pub price: Money,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub volume: u64,
    pub change_rate: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaceOrderRequest {
    pub side: Side,
    pub symbol: Symbol,
    pub quantity: u64,
    /// `0` for market orders (spec §4.2).
    pub price: Money,
    pub order_type: OrderType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaceOrderResponse {
    pub order_no: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderExecutionStatus {
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedOrder {
    pub order_no: String,
    pub side: Side,
    pub ordered_qty: u64,
    pub filled_qty: u64,
    pub avg_price: Money,
    pub remaining_qty: u64,
    pub status: OrderExecutionStatus,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Filled,
    Partial,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WaitForExecutionResult {
    pub status: WaitOutcome,
    pub exec_qty: u64,
    pub exec_price: Money,
    pub fills: Vec<ExecutedOrder>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: u64,
    pub avg_price: Money,
    pub current_price: Money,
    pub pnl: Money,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccountBalance {
    pub holdings: Vec<Holding>,
    pub cash: Money,
    pub total_equity: Money,
    pub total_pnl: Money,
}

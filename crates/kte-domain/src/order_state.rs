//! `OrderState` — one row per idempotency key (spec §3, §4.4).

use crate::money::Money;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Paper,
    Real,
    DryRun,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Paper => "PAPER",
            Mode::Real => "REAL",
            Mode::DryRun => "DRY_RUN",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal states per spec §3: no further transition is valid.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderState {
    pub idempotency_key: String,
    pub signal_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub requested_qty: i64,
    pub filled_qty: i64,
    pub remaining_qty: i64,
    pub broker_order_no: Option<String>,
    pub fill_id: Option<String>,
    pub status: OrderStatus,
    pub mode: Mode,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub avg_fill_price: Option<Money>,
}

/// Error raised when a caller attempts a non-monotone status transition.
/// `Partial -> Partial` (successive fill accruals) is the one exception
/// spec §3 calls out, and it is modeled as "same state, new accrual" rather
/// than a transition at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderState {
    pub fn new_pending(
        idempotency_key: String,
        signal_id: String,
        symbol: Symbol,
        side: Side,
        requested_qty: i64,
        mode: Mode,
        now: DateTime<Utc>,
    ) -> Self {
        OrderState {
            idempotency_key,
            signal_id,
            symbol,
            side,
            requested_qty,
            filled_qty: 0,
            remaining_qty: requested_qty,
            broker_order_no: None,
            fill_id: None,
            status: OrderStatus::Pending,
            mode,
            requested_at: now,
            updated_at: now,
            avg_fill_price: None,
        }
    }

    fn rank(status: OrderStatus) -> u8 {
        match status {
            OrderStatus::Pending => 0,
            OrderStatus::Submitted => 1,
            OrderStatus::Partial => 2,
            OrderStatus::Filled => 3,
            OrderStatus::Cancelled => 3,
            OrderStatus::Rejected => 3,
        }
    }

    /// Transition to a new status, enforcing monotonicity. `Partial ->
    /// Partial` is always allowed (successive fill accruals); terminal
    /// states cannot be left once entered.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), IllegalTransition> {
        if self.status.is_terminal() {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        if self.status == OrderStatus::Partial && to == OrderStatus::Partial {
            self.updated_at = now;
            return Ok(());
        }
        if Self::rank(to) < Self::rank(self.status) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn accrue_fill(&mut self, qty: i64, price: Money, now: DateTime<Utc>) {
        let prior_total = self.filled_qty;
        let new_total = prior_total + qty;
        self.avg_fill_price = Some(match self.avg_fill_price {
            Some(prev) if prior_total > 0 => {
                Money::weighted_average(prev, prior_total, price, qty)
            }
            _ => price,
        });
        self.filled_qty = new_total;
        self.remaining_qty = (self.requested_qty - self.filled_qty).max(0);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order() -> OrderState {
        OrderState::new_pending(
            "k1".into(),
            "s1".into(),
            Symbol::new("005930"),
            Side::Buy,
            10,
            Mode::Paper,
            Utc::now(),
        )
    }

    #[test]
    fn terminal_states_cannot_transition_further() {
        let mut o = order();
        o.transition(OrderStatus::Submitted, Utc::now()).unwrap();
        o.transition(OrderStatus::Filled, Utc::now()).unwrap();
        assert!(o.transition(OrderStatus::Cancelled, Utc::now()).is_err());
    }

    #[test]
    fn partial_to_partial_is_allowed_for_successive_fills() {
        let mut o = order();
        o.transition(OrderStatus::Submitted, Utc::now()).unwrap();
        o.transition(OrderStatus::Partial, Utc::now()).unwrap();
        assert!(o.transition(OrderStatus::Partial, Utc::now()).is_ok());
    }

    #[test]
    fn accrue_fill_computes_weighted_average_price() {
        let mut o = order();
        o.accrue_fill(6, Money::from_major(70_000), Utc::now());
        o.accrue_fill(4, Money::from_major(70_100), Utc::now());
        assert_eq!(o.filled_qty, 10);
        assert_eq!(o.remaining_qty, 0);
        // (70000*6 + 70100*4) / 10 = 70040
        assert_eq!(o.avg_fill_price, Some(Money::from_major(70_040)));
    }

    #[test]
    fn backward_transition_rejected() {
        let mut o = order();
        o.transition(OrderStatus::Submitted, Utc::now()).unwrap();
        assert!(o.transition(OrderStatus::Pending, Utc::now()).is_err());
    }
}

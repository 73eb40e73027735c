//! `Position` — the canonical in-flight trade state (spec §3).
//!
//! Fields fixed at entry (`entry_price`, `atr_at_entry`) are never mutated
//! after construction; only `quantity`, `trailing_stop`, and `highest_price`
//! change over the position's life.

use crate::money::Money;
use crate::symbol::Symbol;
use chrono::NaiveDate;

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PositionState {
    Wait,
    Entered,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub entry_price: Money,
    pub quantity: i64,
    pub entry_date: NaiveDate,
    pub stop_loss: Money,
    pub take_profit: Option<Money>,
    pub trailing_stop: Money,
    pub highest_price: Money,
    pub atr_at_entry: Money,
    pub state: PositionState,
}

/// Error returned by [`Position::new`] when an invariant from spec §3 is
/// violated. Construction is the only place these invariants are checked;
/// once built, a `Position`'s fixed fields never change again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PositionInvariantError {
    NonPositiveQuantity,
    StopNotBelowEntry,
    TakeProfitNotAboveEntry,
    TrailingBelowStop,
    HighestBelowEntry,
    NonPositiveAtr,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        entry_price: Money,
        quantity: i64,
        entry_date: NaiveDate,
        stop_loss: Money,
        take_profit: Option<Money>,
        atr_at_entry: Money,
    ) -> Result<Self, PositionInvariantError> {
        if quantity <= 0 {
            return Err(PositionInvariantError::NonPositiveQuantity);
        }
        if !(stop_loss.is_positive() && stop_loss < entry_price) {
            return Err(PositionInvariantError::StopNotBelowEntry);
        }
        if let Some(tp) = take_profit {
            if tp <= entry_price {
                return Err(PositionInvariantError::TakeProfitNotAboveEntry);
            }
        }
        if !atr_at_entry.is_positive() {
            return Err(PositionInvariantError::NonPositiveAtr);
        }
        Ok(Position {
            symbol,
            entry_price,
            quantity,
            entry_date,
            stop_loss,
            take_profit,
            trailing_stop: stop_loss,
            highest_price: entry_price,
            atr_at_entry,
            state: PositionState::Entered,
        })
    }

    /// Raise the trailing stop; per spec §4.6 this is monotone non-decreasing
    /// and is the only way `trailing_stop` ever changes post-entry.
    pub fn raise_trailing_stop(&mut self, candidate: Money) {
        if candidate > self.trailing_stop {
            self.trailing_stop = candidate;
        }
    }

    /// Record a new high for the trailing-stop calculation.
    pub fn update_highest_price(&mut self, price: Money) {
        if price > self.highest_price {
            self.highest_price = price;
        }
    }

    /// Weighted-average re-entry scaling (disabled by default — see
    /// `EngineConfig::allow_scale_in`). `stop_loss`/`take_profit`/
    /// `atr_at_entry` remain fixed; only `entry_price` and `quantity` change.
    pub fn scale_in(&mut self, fill_price: Money, fill_qty: i64) {
        debug_assert!(fill_qty > 0);
        self.entry_price = Money::weighted_average(
            self.entry_price,
            self.quantity,
            fill_price,
            fill_qty,
        );
        self.quantity += fill_qty;
    }

    /// Reduce quantity on a partial SELL fill. `entry_price` is unchanged.
    /// Returns `true` if the position is now fully closed.
    pub fn reduce_quantity(&mut self, sold_qty: i64) -> bool {
        debug_assert!(sold_qty > 0 && sold_qty <= self.quantity);
        self.quantity -= sold_qty;
        self.quantity == 0
    }

    pub fn unrealized_pct(&self, current_price: Money) -> f64 {
        let entry = self.entry_price.as_f64();
        if entry == 0.0 {
            return 0.0;
        }
        (current_price.as_f64() - entry) / entry * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::new("005930")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 20).unwrap()
    }

    #[test]
    fn construction_fixes_trailing_and_highest_at_entry() {
        let p = Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            date(),
            Money::from_major(67_000),
            Some(Money::from_major(74_500)),
            Money::from_major(1_500),
        )
        .unwrap();
        assert_eq!(p.trailing_stop, Money::from_major(67_000));
        assert_eq!(p.highest_price, Money::from_major(70_000));
        assert_eq!(p.state, PositionState::Entered);
    }

    #[test]
    fn rejects_stop_not_below_entry() {
        let err = Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            date(),
            Money::from_major(70_000),
            None,
            Money::from_major(1_500),
        )
        .unwrap_err();
        assert_eq!(err, PositionInvariantError::StopNotBelowEntry);
    }

    #[test]
    fn trailing_stop_never_decreases() {
        let mut p = Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            date(),
            Money::from_major(67_000),
            None,
            Money::from_major(1_500),
        )
        .unwrap();
        p.raise_trailing_stop(Money::from_major(68_000));
        assert_eq!(p.trailing_stop, Money::from_major(68_000));
        p.raise_trailing_stop(Money::from_major(67_500)); // lower: ignored
        assert_eq!(p.trailing_stop, Money::from_major(68_000));
    }

    #[test]
    fn scale_in_reweights_entry_price() {
        let mut p = Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            date(),
            Money::from_major(67_000),
            None,
            Money::from_major(1_500),
        )
        .unwrap();
        p.scale_in(Money::from_major(71_000), 5);
        assert_eq!(p.entry_price, Money::from_minor(7_033_333));
        assert_eq!(p.quantity, 15);
    }

    #[test]
    fn reduce_quantity_keeps_entry_price_and_signals_full_close() {
        let mut p = Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            date(),
            Money::from_major(67_000),
            None,
            Money::from_major(1_500),
        )
        .unwrap();
        assert!(!p.reduce_quantity(6));
        assert_eq!(p.entry_price, Money::from_major(70_000));
        assert_eq!(p.quantity, 4);
        assert!(p.reduce_quantity(4));
        assert_eq!(p.quantity, 0);
    }
}

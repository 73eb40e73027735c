//! Fixed-point money type.
//!
//! All monetary values in this system (prices, P&L, equity) are quantized to
//! two decimal places at the broker boundary (spec §6 "Precision"). Rather
//! than carry `f64` prices through the strategy/risk/store boundary, we use
//! a fixed-point `i64` at 1e-2 scale: `Money::new(7_000_000)` is KRW 70,000.00.
//!
//! There is intentionally no `From<i64>` impl — construction always goes
//! through [`Money::from_major`] or [`Money::from_minor`] so call sites are
//! explicit about which scale they mean.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A fixed-point monetary amount at 1e-2 scale (minor units = cents/jeon).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MAX: Money = Money(i64::MAX);
    pub const MIN: Money = Money(i64::MIN);

    /// Construct from whole-unit major value (e.g. `70_000` KRW).
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Construct from already-scaled minor units (value * 100).
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Construct by quantizing an `f64` to the nearest minor unit (half-up).
    pub fn from_f64_quantized(value: f64) -> Self {
        Money((value * 100.0).round() as i64)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }

    pub fn abs(self) -> Money {
        Money(self.0.saturating_abs())
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    /// Multiply a per-share price by an integer quantity. `None` on overflow.
    pub fn checked_mul_qty(self, qty: i64) -> Option<Money> {
        let wide = (self.0 as i128) * (qty as i128);
        if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
            None
        } else {
            Some(Money(wide as i64))
        }
    }

    /// Weighted-average re-entry price, rounded to 2 decimal places:
    /// `(old*old_qty + new*new_qty) / (old_qty+new_qty)`.
    pub fn weighted_average(old: Money, old_qty: i64, new: Money, new_qty: i64) -> Money {
        debug_assert!(old_qty > 0 && new_qty > 0);
        let total_qty = old_qty + new_qty;
        let numerator = (old.0 as i128) * (old_qty as i128) + (new.0 as i128) * (new_qty as i128);
        let avg = numerator / (total_qty as i128);
        Money(avg as i64)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

/// Round a ratio (already a plain `f64`, e.g. a percentage) to 4 decimal
/// places for display, per spec §6 precision rules.
pub fn round_ratio_4dp(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

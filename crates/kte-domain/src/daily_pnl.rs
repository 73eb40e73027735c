//! `DailyPnL` — per-trading-day aggregate (spec §3), reset on KST date
//! boundary.

use crate::money::Money;
use chrono::NaiveDate;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DailyPnl {
    pub trade_date: NaiveDate,
    pub realized_pnl: Money,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub consecutive_losses: u32,
    pub starting_capital: Money,
    pub current_equity: Money,
}

impl DailyPnl {
    pub fn new_for_date(trade_date: NaiveDate, starting_capital: Money) -> Self {
        DailyPnl {
            trade_date,
            realized_pnl: Money::ZERO,
            trades: 0,
            wins: 0,
            losses: 0,
            consecutive_losses: 0,
            starting_capital,
            current_equity: starting_capital,
        }
    }

    /// Reset on KST date boundary crossing, carrying forward the closing
    /// equity as the new day's starting capital.
    pub fn roll_to(&mut self, new_date: NaiveDate) {
        if new_date != self.trade_date {
            let carry_equity = self.current_equity;
            *self = DailyPnl::new_for_date(new_date, carry_equity);
        }
    }

    pub fn record_trade(&mut self, pnl: Money) {
        self.realized_pnl += pnl;
        self.trades += 1;
        if pnl.is_positive() {
            self.wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losses += 1;
            self.consecutive_losses += 1;
        }
    }

    pub fn daily_realized_pct(&self) -> f64 {
        let start = self.starting_capital.as_f64();
        if start == 0.0 {
            return 0.0;
        }
        self.realized_pnl.as_f64() / start * 100.0
    }
}

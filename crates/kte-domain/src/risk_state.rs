//! `RiskState` — persistent across runs (spec §3).

use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KillSwitch {
    Off,
    Armed { reason: String },
    Tripped { reason: String, at: chrono::DateTime<chrono::Utc> },
}

impl KillSwitch {
    pub fn is_tripped(&self) -> bool {
        matches!(self, KillSwitch::Tripped { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RiskState {
    pub cumulative_drawdown_pct: i64, // stored as basis points (1e-4) to stay integer/deterministic
    pub peak_equity: Money,
    pub kill_switch: KillSwitch,
}

impl RiskState {
    pub fn new(starting_equity: Money) -> Self {
        RiskState {
            cumulative_drawdown_pct: 0,
            peak_equity: starting_equity,
            kill_switch: KillSwitch::Off,
        }
    }

    /// `cumulative_drawdown_pct = (peak - current) / peak * 100` (property 6),
    /// expressed in basis points (1e-4) of percent for deterministic storage.
    pub fn recompute_drawdown(&mut self, current_equity: Money) {
        if current_equity > self.peak_equity {
            self.peak_equity = current_equity;
        }
        let peak = self.peak_equity.as_f64();
        if peak <= 0.0 {
            self.cumulative_drawdown_pct = 0;
            return;
        }
        let pct = (peak - current_equity.as_f64()) / peak * 100.0;
        self.cumulative_drawdown_pct = (pct * 10_000.0).round() as i64;
    }

    pub fn drawdown_pct_f64(&self) -> f64 {
        self.cumulative_drawdown_pct as f64 / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_matches_property_6() {
        let mut st = RiskState::new(Money::from_major(10_000_000));
        st.recompute_drawdown(Money::from_major(9_000_000));
        // (10,000,000 - 9,000,000) / 10,000,000 * 100 = 10%
        assert!((st.drawdown_pct_f64() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn peak_is_monotone() {
        let mut st = RiskState::new(Money::from_major(10_000_000));
        st.recompute_drawdown(Money::from_major(11_000_000));
        assert_eq!(st.peak_equity, Money::from_major(11_000_000));
        st.recompute_drawdown(Money::from_major(10_500_000));
        assert_eq!(st.peak_equity, Money::from_major(11_000_000)); // peak unchanged
    }
}

//! Risk manager (C5, spec §4.5): order admission gating, trade P&L
//! recording, kill switch arming/tripping, account-snapshot TTL.

use chrono::{DateTime, Utc};
use kte_config::EngineConfig;
use kte_domain::{DailyPnl, KillSwitch, Money, RiskState};

const SNAPSHOT_TTL: chrono::Duration = chrono::Duration::seconds(60);

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub reason: Option<String>,
    pub should_exit: bool,
}

impl CheckResult {
    fn ok() -> Self {
        CheckResult {
            passed: true,
            reason: None,
            should_exit: false,
        }
    }

    fn fail(reason: impl Into<String>, should_exit: bool) -> Self {
        CheckResult {
            passed: false,
            reason: Some(reason.into()),
            should_exit,
        }
    }
}

pub struct RiskManager {
    state: RiskState,
    daily: DailyPnl,
    last_snapshot_at: Option<DateTime<Utc>>,
}

impl RiskManager {
    pub fn new(state: RiskState, daily: DailyPnl) -> Self {
        RiskManager {
            state,
            daily,
            last_snapshot_at: None,
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn daily(&self) -> &DailyPnl {
        &self.daily
    }

    /// spec §4.5 `checkOrderAllowed`.
    pub fn check_order_allowed(&self, is_closing_position: bool, cfg: &EngineConfig) -> CheckResult {
        if self.state.kill_switch.is_tripped() {
            if is_closing_position {
                return CheckResult::ok();
            }
            return CheckResult::fail("kill switch tripped", true);
        }
        if is_closing_position {
            return CheckResult::ok();
        }
        if self.daily.consecutive_losses >= cfg.max_consecutive_losses {
            return CheckResult::fail("max consecutive losses reached", false);
        }
        if self.daily.trades >= cfg.daily_max_trades {
            return CheckResult::fail("daily trade limit reached", false);
        }
        if self.daily.daily_realized_pct() <= -cfg.daily_max_loss_percent {
            return CheckResult::fail("daily loss limit reached", false);
        }
        if self.state.drawdown_pct_f64() >= cfg.max_cumulative_drawdown_pct {
            return CheckResult::fail("cumulative drawdown limit reached", false);
        }
        CheckResult::ok()
    }

    /// spec §4.5 `checkKillSwitch` — read-only.
    pub fn check_kill_switch(&self) -> CheckResult {
        match &self.state.kill_switch {
            KillSwitch::Tripped { reason, .. } => CheckResult::fail(reason.clone(), true),
            KillSwitch::Armed { reason } => CheckResult {
                passed: true,
                reason: Some(reason.clone()),
                should_exit: false,
            },
            KillSwitch::Off => CheckResult::ok(),
        }
    }

    /// spec §4.5 `recordTradePnL`: updates realized P&L/wins/losses/
    /// consecutive losses, recomputes drawdown off `current_equity`, and may
    /// arm or trip the kill switch.
    pub fn record_trade_pnl(&mut self, pnl: Money, cfg: &EngineConfig, now: DateTime<Utc>) {
        self.daily.record_trade(pnl);
        self.daily.current_equity = self.daily.current_equity.saturating_add(pnl);
        self.state.recompute_drawdown(self.daily.current_equity);
        self.update_kill_switch(cfg, now);
    }

    fn update_kill_switch(&mut self, cfg: &EngineConfig, now: DateTime<Utc>) {
        let drawdown = self.state.drawdown_pct_f64();
        if drawdown >= cfg.max_cumulative_drawdown_pct {
            if !self.state.kill_switch.is_tripped() {
                tracing::error!(drawdown, "cumulative drawdown tripped kill switch");
            }
            self.state.kill_switch = KillSwitch::Tripped {
                reason: format!("cumulative drawdown {drawdown:.2}% >= {:.2}%", cfg.max_cumulative_drawdown_pct),
                at: now,
            };
        } else if drawdown >= cfg.cumulative_drawdown_warning_pct {
            if matches!(self.state.kill_switch, KillSwitch::Off) {
                self.state.kill_switch = KillSwitch::Armed {
                    reason: format!("cumulative drawdown {drawdown:.2}% >= warning {:.2}%", cfg.cumulative_drawdown_warning_pct),
                };
            }
        }
    }

    /// spec §4.5 `updateAccountSnapshot`: refreshes equity-derived metrics
    /// with a ≥60s TTL, and synchronizes `starting_capital` once per KST
    /// date from live equity.
    pub fn update_account_snapshot(
        &mut self,
        equity: Money,
        kst_date: chrono::NaiveDate,
        now: DateTime<Utc>,
        cfg: &EngineConfig,
    ) -> bool {
        if let Some(last) = self.last_snapshot_at {
            if now.signed_duration_since(last) < SNAPSHOT_TTL {
                return false;
            }
        }
        let is_new_day = self.daily.trade_date != kst_date;
        self.daily.roll_to(kst_date);
        if is_new_day {
            self.daily.starting_capital = equity;
        }
        self.daily.current_equity = equity;
        self.state.recompute_drawdown(equity);
        self.update_kill_switch(cfg, now);
        self.last_snapshot_at = Some(now);
        true
    }

    /// Manual kill-switch trip (e.g. from the `KILL_SWITCH` config flag or
    /// an operator command).
    pub fn trip_kill_switch(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.state.kill_switch = KillSwitch::Tripped {
            reason: reason.into(),
            at: now,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    fn manager() -> RiskManager {
        let date = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let capital = Money::from_major(10_000_000);
        RiskManager::new(RiskState::new(capital), DailyPnl::new_for_date(date, capital))
    }

    #[test]
    fn closing_position_always_allowed_even_when_tripped() {
        let mut m = manager();
        m.trip_kill_switch("test", Utc::now());
        assert!(m.check_order_allowed(true, &cfg()).passed);
        let entry_check = m.check_order_allowed(false, &cfg());
        assert!(!entry_check.passed);
        assert!(entry_check.should_exit);
    }

    #[test]
    fn consecutive_losses_block_new_entries() {
        let mut m = manager();
        let c = cfg();
        m.record_trade_pnl(Money::from_major(-50_000), &c, Utc::now());
        m.record_trade_pnl(Money::from_major(-50_000), &c, Utc::now());
        let check = m.check_order_allowed(false, &c);
        assert!(!check.passed);
        assert!(!check.should_exit);
    }

    #[test]
    fn daily_loss_limit_blocks_new_entries() {
        let mut m = manager();
        let c = cfg();
        // 2% of 10,000,000 is 200,000; a single 250,000 loss breaches it.
        m.record_trade_pnl(Money::from_major(-250_000), &c, Utc::now());
        let check = m.check_order_allowed(false, &c);
        assert!(!check.passed);
    }

    #[test]
    fn cumulative_drawdown_trips_kill_switch() {
        let mut m = manager();
        let c = cfg();
        // Loss large enough to push drawdown past 15%.
        m.record_trade_pnl(Money::from_major(-1_600_000), &c, Utc::now());
        assert!(m.state().kill_switch.is_tripped());
        assert!(m.check_kill_switch().should_exit);
    }

    #[test]
    fn warning_threshold_arms_without_tripping() {
        let mut m = manager();
        let c = cfg();
        // 11% drawdown: above the 10% warning but below the 15% trip line.
        m.record_trade_pnl(Money::from_major(-1_100_000), &c, Utc::now());
        assert!(!m.state().kill_switch.is_tripped());
        assert!(matches!(m.state().kill_switch, KillSwitch::Armed { .. }));
    }

    #[test]
    fn snapshot_respects_ttl() {
        let mut m = manager();
        let c = cfg();
        let date = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let t0 = Utc::now();
        assert!(m.update_account_snapshot(Money::from_major(10_000_000), date, t0, &c));
        assert!(!m.update_account_snapshot(
            Money::from_major(10_100_000),
            date,
            t0 + chrono::Duration::seconds(30),
            &c
        ));
        assert!(m.update_account_snapshot(
            Money::from_major(10_100_000),
            date,
            t0 + chrono::Duration::seconds(61),
            &c
        ));
    }

    #[test]
    fn new_day_resyncs_starting_capital_from_live_equity() {
        let mut m = manager();
        let c = cfg();
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 7, 21).unwrap();
        let t0 = Utc::now();
        m.update_account_snapshot(Money::from_major(10_500_000), d1, t0, &c);
        m.update_account_snapshot(
            Money::from_major(10_800_000),
            d2,
            t0 + chrono::Duration::hours(20),
            &c,
        );
        assert_eq!(m.daily().starting_capital, Money::from_major(10_800_000));
        assert_eq!(m.daily().trades, 0);
    }
}

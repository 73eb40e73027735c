//! S3 — gap down: position open at 70000 with `MAX_GAP_LOSS_PCT=2.0` and the
//! entry price as gap reference. An open at 68500 is a 2.143% gap from
//! entry, clearing the threshold, so the tick exits via `GAP_PROTECTION` at
//! the tick price (68600) even though price hasn't reached the stop.

use chrono::NaiveDate;
use kte_domain::{BarSeries, ExitReason, Money, Position, Symbol};
use kte_strategy::{EventCalendar, SignalType};
use kte_testkit::constant_atr_uptrend;

#[test]
fn gap_protection_fires_before_price_reaches_stop() {
    let mut cfg = kte_config::EngineConfig::default();
    assert_eq!(cfg.gap_reference, kte_config::GapReference::EntryPrice);
    cfg.max_gap_loss_pct = 2.0;

    let today = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
    let bars = BarSeries::from_unordered(constant_atr_uptrend(50, 68_260, 10, 1500));
    let calendar = EventCalendar::new(Vec::new());

    let mut position = Position::new(
        Symbol::new("005930"),
        Money::from_major(70_000),
        10,
        today,
        Money::from_major(67_000),
        Some(Money::from_major(74_500)),
        Money::from_major(1_500),
    )
    .unwrap();

    let open_price = Money::from_major(68_500);
    let tick_price = Money::from_major(68_600);
    let signal = kte_strategy::evaluate(&bars, tick_price, Some(open_price), Some(&mut position), &cfg, &calendar, today);

    assert_eq!(signal.signal_type, SignalType::Sell);
    assert_eq!(signal.exit_reason, Some(ExitReason::GapProtection));
    assert_eq!(signal.price, tick_price);
    let gap_fields = signal.gap_fields.expect("gap exits carry gap_fields");
    assert!((gap_fields.gap_pct - 2.142857).abs() < 1e-3);
}

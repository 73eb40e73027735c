//! S1 — clean win: a 50-day uptrend triggers BUY at 70000 with
//! stop=67000/tp=74500, then a later tick at 75000 exits via
//! `ATR_TAKE_PROFIT` for a realized gain of 5000/share.

use chrono::NaiveDate;
use kte_domain::{BarSeries, ExitReason, Money};
use kte_strategy::{EventCalendar, SignalType};
use kte_testkit::constant_atr_uptrend;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 20).unwrap()
}

#[test]
fn tick1_buys_then_tick2_take_profits() {
    let mut cfg = kte_config::EngineConfig::default();
    cfg.execution_mode = kte_domain::Mode::Paper;

    // Constant true-range bars pin `latest_atr` to exactly 1500; a steady
    // rise keeps the series comfortably trending (close above SMA, ADX well
    // past the default 25.0 threshold) without needing to hand-derive ADX.
    let bars = BarSeries::from_unordered(constant_atr_uptrend(50, 68_260, 10, 1500));
    let calendar = EventCalendar::new(Vec::new());

    let tick_price = Money::from_major(70_000);
    let signal = kte_strategy::evaluate(&bars, tick_price, Some(Money::from_major(69_800)), None, &cfg, &calendar, today());

    assert_eq!(signal.signal_type, SignalType::Buy);
    assert_eq!(signal.price, tick_price);
    assert_eq!(signal.stop_loss, Some(Money::from_major(67_000)));
    assert_eq!(signal.take_profit, Some(Money::from_major(74_500)));

    let mut position = kte_domain::Position::new(
        kte_domain::Symbol::new("005930"),
        signal.price,
        10,
        today(),
        signal.stop_loss.unwrap(),
        signal.take_profit,
        Money::from_f64_quantized(signal.atr.unwrap()),
    )
    .unwrap();

    let exit_tick = Money::from_major(75_000);
    let exit_signal = kte_strategy::evaluate(&bars, exit_tick, Some(exit_tick), Some(&mut position), &cfg, &calendar, today());

    assert_eq!(exit_signal.signal_type, SignalType::Sell);
    assert_eq!(exit_signal.exit_reason, Some(ExitReason::AtrTakeProfit));

    let realized_per_share = exit_tick.saturating_sub(position.entry_price);
    assert_eq!(realized_per_share, Money::from_major(5_000));
}

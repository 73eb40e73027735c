//! Strategy (C6, spec §4.6): pure function of `(Bars, tick_price, open_price,
//! position?)` → `Signal`. Indicators are recomputed every call from
//! [`kte_indicators::compute`] and never persisted; the only state that
//! survives between calls is the caller-owned [`kte_domain::Position`].

pub mod event_calendar;

use chrono::NaiveDate;
use kte_config::{EngineConfig, GapReference};
use kte_domain::{BarSeries, ExitReason, Money, Position};
use kte_indicators::{self, IndicatorConfig, IndicatorSnapshot};

pub use event_calendar::EventCalendar;

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GapFields {
    pub gap_pct: f64,
    pub reference_price: Money,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub price: Money,
    pub stop_loss: Option<Money>,
    pub take_profit: Option<Money>,
    pub trailing_stop: Option<Money>,
    pub exit_reason: Option<ExitReason>,
    pub reason_code: Option<String>,
    pub atr: Option<f64>,
    pub trend: Trend,
    pub near_stop_pct: Option<f64>,
    pub near_tp_pct: Option<f64>,
    pub gap_fields: Option<GapFields>,
}

impl Signal {
    fn hold(atr: Option<f64>, trend: Trend) -> Self {
        Signal {
            signal_type: SignalType::Hold,
            price: Money::ZERO,
            stop_loss: None,
            take_profit: None,
            trailing_stop: None,
            exit_reason: None,
            reason_code: None,
            atr,
            trend,
            near_stop_pct: None,
            near_tp_pct: None,
            gap_fields: None,
        }
    }
}

fn indicator_config(cfg: &EngineConfig) -> IndicatorConfig {
    IndicatorConfig {
        atr_period: cfg.atr_period,
        sma_period: cfg.trend_ma_period,
        adx_period: cfg.adx_period,
        ..IndicatorConfig::default()
    }
}

fn classify_trend(snapshot: &IndicatorSnapshot, close: f64) -> Trend {
    match snapshot.latest_sma {
        Some(sma) if close > sma => Trend::Up,
        Some(sma) if close < sma => Trend::Down,
        _ => Trend::Sideways,
    }
}

/// Evaluates entry conditions 1-6 (spec §4.6) against the latest bar. Returns
/// `Some(atr)` when every condition holds, `None` otherwise.
fn entry_signal(
    bars: &BarSeries,
    tick_price: Money,
    cfg: &EngineConfig,
    calendar: &EventCalendar,
    today: NaiveDate,
) -> Option<(f64, Trend)> {
    if bars.len() < cfg.trend_ma_period {
        return None;
    }
    let snapshot = kte_indicators::compute(bars, &indicator_config(cfg));
    let atr = snapshot.latest_atr?;
    if !atr.is_finite() {
        return None;
    }
    if let Some(mean_atr) = snapshot.mean_recent_atr {
        if mean_atr > 0.0 && atr / mean_atr > cfg.atr_spike_threshold {
            return None;
        }
    }
    let adx = snapshot.latest_adx?;
    if adx < cfg.adx_threshold {
        return None;
    }
    let close = bars.last()?.close.as_f64();
    let trend = classify_trend(&snapshot, close);
    if trend != Trend::Up {
        return None;
    }
    let previous_high = bars.previous()?.high;
    if tick_price <= previous_high {
        return None;
    }
    if calendar.is_blocked(today) {
        return None;
    }
    Some((atr, trend))
}

/// Computes the fixed entry levels (spec §4.6 "On entry... fixes").
pub fn entry_levels(entry_price: Money, atr: f64, cfg: &EngineConfig) -> (Money, Option<Money>) {
    let atr_stop = entry_price.as_f64() - cfg.atr_multiplier_sl * atr;
    let pct_floor = entry_price.as_f64() * (1.0 - cfg.max_loss_pct / 100.0);
    let stop = atr_stop.max(pct_floor).max(0.0);
    let stop_loss = Money::from_f64_quantized(stop);
    let take_profit = Some(Money::from_f64_quantized(
        entry_price.as_f64() + cfg.atr_multiplier_tp * atr,
    ));
    (stop_loss, take_profit)
}

fn gap_reference_price(position: &Position, cfg: &EngineConfig) -> Money {
    match cfg.gap_reference {
        GapReference::EntryPrice => position.entry_price,
        GapReference::Stop => position.stop_loss,
        GapReference::PrevClose => position.entry_price, // resolved by caller when a prior close is available
    }
}

/// Evaluates exit conditions 1-5 in priority order (spec §4.6). Mutates
/// `position`'s `trailing_stop`/`highest_price` in place when the trailing
/// condition is evaluated (those updates happen regardless of whether it
/// fires, per the monotone-raise invariant).
pub fn exit_signal(
    position: &mut Position,
    bars: &BarSeries,
    tick_price: Money,
    open_price: Option<Money>,
    cfg: &EngineConfig,
) -> Option<(ExitReason, String, Option<GapFields>)> {
    // 1. Gap protection.
    if cfg.enable_gap_protection {
        if let Some(open) = open_price {
            let reference = match cfg.gap_reference {
                GapReference::PrevClose => bars.previous().map(|b| b.close).unwrap_or(position.entry_price),
                _ => gap_reference_price(position, cfg),
            };
            let entry = reference.as_f64();
            if entry > 0.0 {
                let gap_pct = (entry - open.as_f64()) / entry * 100.0;
                if gap_pct >= cfg.max_gap_loss_pct + cfg.gap_epsilon_pct {
                    return Some((
                        ExitReason::GapProtection,
                        format!("gap {gap_pct:.3}% >= {:.3}%", cfg.max_gap_loss_pct),
                        Some(GapFields {
                            gap_pct,
                            reference_price: reference,
                        }),
                    ));
                }
            }
        }
    }

    // 2. ATR stop.
    if tick_price <= position.stop_loss {
        return Some((
            ExitReason::AtrStop,
            format!("price {tick_price} <= stop {}", position.stop_loss),
            None,
        ));
    }

    // 3. ATR take-profit.
    if let Some(tp) = position.take_profit {
        if tick_price >= tp {
            return Some((
                ExitReason::AtrTakeProfit,
                format!("price {tick_price} >= target {tp}"),
                None,
            ));
        }
    }

    // 4. Trailing stop (update happens even when it doesn't fire).
    if cfg.enable_trailing_stop {
        let unrealized_pct = position.unrealized_pct(tick_price);
        if unrealized_pct >= cfg.trailing_stop_activation_pct {
            position.update_highest_price(tick_price);
            let candidate = Money::from_f64_quantized(
                position.highest_price.as_f64() - cfg.trailing_stop_atr_multiplier * position.atr_at_entry.as_f64(),
            );
            position.raise_trailing_stop(candidate);
            if tick_price <= position.trailing_stop {
                return Some((
                    ExitReason::TrailingStop,
                    format!("price {tick_price} <= trailing {}", position.trailing_stop),
                    None,
                ));
            }
        }
    }

    // 5. Trend reversal.
    if bars.len() >= 2 {
        let snapshot = kte_indicators::compute(bars, &indicator_config(cfg));
        if let (Some(latest_sma), Some(prev_sma)) = (snapshot.latest_sma, snapshot.prev_sma) {
            let latest_close = bars.last().unwrap().close.as_f64();
            let prev_close = bars.previous().unwrap().close.as_f64();
            if prev_close > prev_sma && latest_close < latest_sma {
                return Some((ExitReason::TrendReversal, "MA cross-down".to_string(), None));
            }
        }
        if let (Some(latest_adx), Some(prev_adx)) = (snapshot.latest_adx, snapshot.prev_adx) {
            if latest_adx < 20.0 && prev_adx >= 25.0 {
                return Some((ExitReason::TrendReversal, "ADX collapse".to_string(), None));
            }
        }
    }

    None
}

/// Top-level evaluation: routes to entry or exit logic depending on whether
/// a position is already open.
pub fn evaluate(
    bars: &BarSeries,
    tick_price: Money,
    open_price: Option<Money>,
    position: Option<&mut Position>,
    cfg: &EngineConfig,
    calendar: &EventCalendar,
    today: NaiveDate,
) -> Signal {
    match position {
        None => match entry_signal(bars, tick_price, cfg, calendar, today) {
            Some((atr, trend)) => {
                let (stop_loss, take_profit) = entry_levels(tick_price, atr, cfg);
                Signal {
                    signal_type: SignalType::Buy,
                    price: tick_price,
                    stop_loss: Some(stop_loss),
                    take_profit,
                    trailing_stop: Some(stop_loss),
                    exit_reason: None,
                    reason_code: None,
                    atr: Some(atr),
                    trend,
                    near_stop_pct: None,
                    near_tp_pct: None,
                    gap_fields: None,
                }
            }
            None => {
                let snapshot = kte_indicators::compute(bars, &indicator_config(cfg));
                let close = bars.last().map(|b| b.close.as_f64()).unwrap_or(0.0);
                Signal::hold(snapshot.latest_atr, classify_trend(&snapshot, close))
            }
        },
        Some(position) => {
            let snapshot = kte_indicators::compute(bars, &indicator_config(cfg));
            let close = bars.last().map(|b| b.close.as_f64()).unwrap_or(0.0);
            let trend = classify_trend(&snapshot, close);
            match exit_signal(position, bars, tick_price, open_price, cfg) {
                Some((reason, reason_code, gap_fields)) => Signal {
                    signal_type: SignalType::Sell,
                    price: tick_price,
                    stop_loss: Some(position.stop_loss),
                    take_profit: position.take_profit,
                    trailing_stop: Some(position.trailing_stop),
                    exit_reason: Some(reason),
                    reason_code: Some(reason_code),
                    atr: Some(position.atr_at_entry.as_f64()),
                    trend,
                    near_stop_pct: Some(progress_pct(position.entry_price, position.stop_loss, tick_price)),
                    near_tp_pct: position.take_profit.map(|tp| progress_pct(position.entry_price, tp, tick_price)),
                    gap_fields,
                },
                None if cfg.allow_scale_in => {
                    match entry_signal(bars, tick_price, cfg, calendar, today) {
                        Some((atr, entry_trend)) => Signal {
                            signal_type: SignalType::Buy,
                            price: tick_price,
                            stop_loss: Some(position.stop_loss),
                            take_profit: position.take_profit,
                            trailing_stop: Some(position.trailing_stop),
                            exit_reason: None,
                            reason_code: None,
                            atr: Some(atr),
                            trend: entry_trend,
                            near_stop_pct: Some(progress_pct(position.entry_price, position.stop_loss, tick_price)),
                            near_tp_pct: position.take_profit.map(|tp| progress_pct(position.entry_price, tp, tick_price)),
                            gap_fields: None,
                        },
                        None => Signal {
                            signal_type: SignalType::Hold,
                            price: tick_price,
                            stop_loss: Some(position.stop_loss),
                            take_profit: position.take_profit,
                            trailing_stop: Some(position.trailing_stop),
                            exit_reason: None,
                            reason_code: None,
                            atr: Some(position.atr_at_entry.as_f64()),
                            trend,
                            near_stop_pct: Some(progress_pct(position.entry_price, position.stop_loss, tick_price)),
                            near_tp_pct: position.take_profit.map(|tp| progress_pct(position.entry_price, tp, tick_price)),
                            gap_fields: None,
                        },
                    }
                }
                None => Signal {
                    signal_type: SignalType::Hold,
                    price: tick_price,
                    stop_loss: Some(position.stop_loss),
                    take_profit: position.take_profit,
                    trailing_stop: Some(position.trailing_stop),
                    exit_reason: None,
                    reason_code: None,
                    atr: Some(position.atr_at_entry.as_f64()),
                    trend,
                    near_stop_pct: Some(progress_pct(position.entry_price, position.stop_loss, tick_price)),
                    near_tp_pct: position.take_profit.map(|tp| progress_pct(position.entry_price, tp, tick_price)),
                    gap_fields: None,
                },
            }
        }
    }
}

/// Progress from `entry` toward `level` as a percentage: 0% at entry, 100%
/// once `price` reaches `level`. Used by the executor to choose a tighter
/// tick interval as price nears the stop (spec §4.9).
fn progress_pct(entry: Money, level: Money, price: Money) -> f64 {
    let entry = entry.as_f64();
    if entry <= 0.0 || level.as_f64() <= 0.0 {
        return 0.0;
    }
    let total_distance = level.as_f64() - entry;
    if total_distance == 0.0 {
        return 100.0;
    }
    ((price.as_f64() - entry) / total_distance) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::{Bar, Symbol};

    fn bar(d: u32, open: i64, high: i64, low: i64, close: i64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2026, 1, d).unwrap(),
            open: Money::from_major(open),
            high: Money::from_major(high),
            low: Money::from_major(low),
            close: Money::from_major(close),
            volume: 10_000,
        }
    }

    fn uptrend_bars(n: u32) -> BarSeries {
        let mut bars = Vec::new();
        let mut level: i64 = 60_000;
        for d in 1..=n {
            bars.push(bar(d, level - 200, level + 500, level - 500, level));
            level += 300;
        }
        BarSeries::from_unordered(bars)
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            trend_ma_period: 10,
            atr_period: 5,
            adx_period: 5,
            adx_threshold: 0.0, // relax for small synthetic fixtures
            ..EngineConfig::default()
        }
    }

    #[test]
    fn too_few_bars_never_enters() {
        let bars = uptrend_bars(5);
        let calendar = EventCalendar::default();
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let sig = evaluate(&bars, Money::from_major(70_000), None, None, &cfg(), &calendar, today);
        assert_eq!(sig.signal_type, SignalType::Hold);
    }

    #[test]
    fn blocked_calendar_date_suppresses_entry() {
        let bars = uptrend_bars(30);
        let today = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let calendar = EventCalendar::new([today]);
        let last_high = bars.last().unwrap().high;
        let breakout = last_high + Money::from_major(1_000);
        let sig = evaluate(&bars, breakout, None, None, &cfg(), &calendar, today);
        assert_eq!(sig.signal_type, SignalType::Hold);
    }

    #[test]
    fn breakout_in_clean_uptrend_triggers_buy() {
        let bars = uptrend_bars(30);
        let today = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let calendar = EventCalendar::default();
        let last_high = bars.last().unwrap().high;
        let breakout = last_high + Money::from_major(1_000);
        let sig = evaluate(&bars, breakout, None, None, &cfg(), &calendar, today);
        assert_eq!(sig.signal_type, SignalType::Buy);
        assert!(sig.stop_loss.unwrap() < breakout);
    }

    fn position(entry: i64, stop: i64, tp: Option<i64>, atr: i64) -> Position {
        Position::new(
            Symbol::new("005930"),
            Money::from_major(entry),
            10,
            NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            Money::from_major(stop),
            tp.map(Money::from_major),
            Money::from_major(atr),
        )
        .unwrap()
    }

    #[test]
    fn price_at_or_below_stop_exits() {
        let mut pos = position(70_000, 67_000, Some(74_500), 1_500);
        let bars = uptrend_bars(5);
        let (reason, _, _) = exit_signal(&mut pos, &bars, Money::from_major(66_900), None, &cfg()).unwrap();
        assert_eq!(reason, ExitReason::AtrStop);
    }

    #[test]
    fn price_at_or_above_target_exits() {
        let mut pos = position(70_000, 67_000, Some(74_500), 1_500);
        let bars = uptrend_bars(5);
        let (reason, _, _) = exit_signal(&mut pos, &bars, Money::from_major(74_600), None, &cfg()).unwrap();
        assert_eq!(reason, ExitReason::AtrTakeProfit);
    }

    #[test]
    fn gap_down_below_reference_triggers_gap_protection() {
        let mut pos = position(70_000, 60_000, None, 1_500);
        let bars = uptrend_bars(5);
        let mut c = cfg();
        c.max_gap_loss_pct = 2.0;
        c.gap_reference = GapReference::EntryPrice;
        let (reason, _, _) = exit_signal(
            &mut pos,
            &bars,
            Money::from_major(68_600),
            Some(Money::from_major(68_500)),
            &c,
        )
        .unwrap();
        assert_eq!(reason, ExitReason::GapProtection);
    }

    #[test]
    fn trailing_stop_is_monotone_and_fires_on_pullback() {
        let mut pos = position(70_000, 67_000, None, 1_000);
        let bars = uptrend_bars(5);
        let mut c = cfg();
        c.enable_trailing_stop = true;
        c.trailing_stop_activation_pct = 1.0;
        c.trailing_stop_atr_multiplier = 2.0;

        // Price runs up: no exit, but trailing_stop should ratchet upward.
        assert!(exit_signal(&mut pos, &bars, Money::from_major(75_000), None, &c).is_none());
        let raised = pos.trailing_stop;
        assert!(raised > Money::from_major(67_000));

        // Pullback below the raised trailing stop fires the exit.
        let (reason, _, _) = exit_signal(&mut pos, &bars, raised - Money::from_major(1), None, &c).unwrap();
        assert_eq!(reason, ExitReason::TrailingStop);
    }

    #[test]
    fn priority_order_prefers_gap_over_atr_stop() {
        // Both the gap condition and the ATR stop condition are satisfied;
        // gap protection must win since it is evaluated first.
        let mut pos = position(70_000, 69_000, None, 500);
        let bars = uptrend_bars(5);
        let mut c = cfg();
        c.max_gap_loss_pct = 2.0;
        c.gap_reference = GapReference::EntryPrice;
        let (reason, _, _) = exit_signal(
            &mut pos,
            &bars,
            Money::from_major(68_000),
            Some(Money::from_major(68_000)),
            &c,
        )
        .unwrap();
        assert_eq!(reason, ExitReason::GapProtection);
    }

    #[test]
    fn scale_in_disabled_never_buys_while_entered() {
        let mut pos = position(70_000, 67_000, Some(80_000), 1_000);
        let bars = uptrend_bars(30);
        let today = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let calendar = EventCalendar::default();
        let mut c = cfg();
        c.allow_scale_in = false;
        let last_high = bars.last().unwrap().high;
        let breakout = last_high + Money::from_major(1_000);
        let sig = evaluate(&bars, breakout, None, Some(&mut pos), &c, &calendar, today);
        assert_eq!(sig.signal_type, SignalType::Hold);
    }

    #[test]
    fn scale_in_enabled_buys_on_breakout_while_entered() {
        let mut pos = position(70_000, 67_000, Some(80_000), 1_000);
        let bars = uptrend_bars(30);
        let today = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let calendar = EventCalendar::default();
        let mut c = cfg();
        c.allow_scale_in = true;
        let last_high = bars.last().unwrap().high;
        let breakout = last_high + Money::from_major(1_000);
        let sig = evaluate(&bars, breakout, None, Some(&mut pos), &c, &calendar, today);
        assert_eq!(sig.signal_type, SignalType::Buy);
    }
}

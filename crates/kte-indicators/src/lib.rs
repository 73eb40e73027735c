//! Streaming-style indicator module (spec §3, §4.6, §9): computes ATR(14),
//! SMA(50), ADX(14) from a [`kte_domain::BarSeries`]. Indicators are always
//! derived fresh from the bar window — never persisted (spec §3 "derived,
//! never stored").

pub mod adx;
pub mod atr;
pub mod sma;

use kte_domain::BarSeries;

#[derive(Copy, Clone, Debug)]
pub struct IndicatorConfig {
    pub atr_period: usize,
    pub sma_period: usize,
    pub adx_period: usize,
    pub atr_variant: atr::AtrVariant,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            atr_period: 14,
            sma_period: 50,
            adx_period: 14,
            atr_variant: atr::AtrVariant::Wilder,
        }
    }
}

/// The latest indicator reading plus enough history to evaluate the ATR
/// spike guard (spec §4.6 condition 2).
#[derive(Clone, Debug, PartialEq)]
pub struct IndicatorSnapshot {
    pub latest_atr: Option<f64>,
    pub mean_recent_atr: Option<f64>, // mean(atr[-2*period:-1])
    pub latest_sma: Option<f64>,
    pub prev_sma: Option<f64>,
    pub latest_adx: Option<f64>,
    pub prev_adx: Option<f64>,
}

pub fn compute(series: &BarSeries, cfg: &IndicatorConfig) -> IndicatorSnapshot {
    let highs: Vec<f64> = series.as_slice().iter().map(|b| b.high.as_f64()).collect();
    let lows: Vec<f64> = series.as_slice().iter().map(|b| b.low.as_f64()).collect();
    let closes: Vec<f64> = series.closes();

    let tr = atr::true_range_series(&highs, &lows, &closes);
    let atr_series = atr::atr_series(&tr, cfg.atr_period, cfg.atr_variant);
    let sma_series = sma::sma_series(&closes, cfg.sma_period);
    let adx_series = adx::adx_series(&highs, &lows, &closes, cfg.adx_period);

    let latest_atr = atr_series.last().copied().flatten();
    let mean_recent_atr = mean_of_trailing_window(&atr_series, 2 * cfg.atr_period, 1);

    IndicatorSnapshot {
        latest_atr,
        mean_recent_atr,
        latest_sma: sma_series.last().copied().flatten(),
        prev_sma: nth_from_end(&sma_series, 1),
        latest_adx: adx_series.last().copied().flatten(),
        prev_adx: nth_from_end(&adx_series, 1),
    }
}

/// Mean of the `window` values ending `skip_last` before the end of
/// `series` (used for the ATR spike guard: `mean(atr[-2*period:-1])`).
fn mean_of_trailing_window(series: &[Option<f64>], window: usize, skip_last: usize) -> Option<f64> {
    if series.len() < window + skip_last {
        return None;
    }
    let end = series.len() - skip_last;
    let start = end.checked_sub(window)?;
    let slice = &series[start..end];
    if slice.iter().any(|v| v.is_none()) {
        return None;
    }
    let sum: f64 = slice.iter().map(|v| v.unwrap()).sum();
    Some(sum / window as f64)
}

fn nth_from_end(series: &[Option<f64>], n: usize) -> Option<f64> {
    if series.len() <= n {
        return None;
    }
    series[series.len() - 1 - n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kte_domain::{Bar, Money};

    fn bar(d: u32, close: i64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2026, 1, d).unwrap(),
            open: Money::from_major(close - 1),
            high: Money::from_major(close + 1),
            low: Money::from_major(close - 2),
            close: Money::from_major(close),
            volume: 1000,
        }
    }

    #[test]
    fn computes_snapshot_with_enough_bars() {
        let mut bars = Vec::new();
        let mut level = 100;
        for d in 1..60 {
            bars.push(bar(d, level));
            level += 1;
        }
        let series = BarSeries::from_unordered(bars);
        let snap = compute(&series, &IndicatorConfig::default());
        assert!(snap.latest_atr.is_some());
        assert!(snap.latest_sma.is_some());
        assert!(snap.latest_adx.is_some());
    }

    #[test]
    fn too_few_bars_yields_none_indicators() {
        let series = BarSeries::from_unordered(vec![bar(1, 100), bar(2, 101)]);
        let snap = compute(&series, &IndicatorConfig::default());
        assert!(snap.latest_atr.is_none());
        assert!(snap.latest_sma.is_none());
        assert!(snap.latest_adx.is_none());
    }
}

//! Average True Range, Wilder-smoothed by default with an SMA fallback
//! (spec §3, §9 — replaces the teacher's pandas-centric computation with a
//! streaming ring-buffer module).

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AtrVariant {
    Wilder,
    Sma,
}

fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    let a = high - low;
    let b = (high - prev_close).abs();
    let c = (low - prev_close).abs();
    a.max(b).max(c)
}

/// Computes the true-range series for `highs`/`lows`/`closes` (all same
/// length, ordered ascending). The first bar has no previous close, so its
/// true range is simply `high - low`.
pub fn true_range_series(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = highs.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            out.push(highs[i] - lows[i]);
        } else {
            out.push(true_range(highs[i], lows[i], closes[i - 1]));
        }
    }
    out
}

/// Computes the ATR series given a true-range series and `period`. Returns
/// one ATR value per true-range input once at least `period` values have
/// accumulated; earlier entries are `None`.
///
/// - [`AtrVariant::Wilder`]: `ATR[period-1] = mean(TR[0..period])`, then
///   `ATR[i] = (ATR[i-1]*(period-1) + TR[i]) / period`.
/// - [`AtrVariant::Sma`]: a plain rolling mean of the last `period` TR
///   values at every index.
pub fn atr_series(tr: &[f64], period: usize, variant: AtrVariant) -> Vec<Option<f64>> {
    let n = tr.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    match variant {
        AtrVariant::Sma => {
            for i in (period - 1)..n {
                let window = &tr[i + 1 - period..=i];
                out[i] = Some(window.iter().sum::<f64>() / period as f64);
            }
        }
        AtrVariant::Wilder => {
            let seed: f64 = tr[0..period].iter().sum::<f64>() / period as f64;
            out[period - 1] = Some(seed);
            let mut prev = seed;
            for (i, tr_i) in tr.iter().enumerate().skip(period) {
                let cur = (prev * (period as f64 - 1.0) + tr_i) / period as f64;
                out[i] = Some(cur);
                prev = cur;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference series: a simple hand-computable ramp.
    fn fixture() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let highs = vec![10.0, 11.0, 12.0, 11.5, 13.0, 14.0];
        let lows = vec![9.0, 9.5, 10.5, 10.0, 11.5, 12.5];
        let closes = vec![9.5, 10.5, 11.5, 10.5, 12.5, 13.5];
        (highs, lows, closes)
    }

    #[test]
    fn true_range_first_bar_is_high_minus_low() {
        let (h, l, c) = fixture();
        let tr = true_range_series(&h, &l, &c);
        assert_eq!(tr[0], 1.0);
    }

    #[test]
    fn wilder_seed_is_sma_of_first_period() {
        let (h, l, c) = fixture();
        let tr = true_range_series(&h, &l, &c);
        let period = 3;
        let series = atr_series(&tr, period, AtrVariant::Wilder);
        let expected_seed = (tr[0] + tr[1] + tr[2]) / 3.0;
        assert!((series[2].unwrap() - expected_seed).abs() < 1e-9);
    }

    #[test]
    fn wilder_smooths_forward_with_weight_period_minus_one() {
        let (h, l, c) = fixture();
        let tr = true_range_series(&h, &l, &c);
        let period = 3;
        let series = atr_series(&tr, period, AtrVariant::Wilder);
        let prev = series[2].unwrap();
        let expected = (prev * 2.0 + tr[3]) / 3.0;
        assert!((series[3].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn sma_variant_is_plain_rolling_mean() {
        let (h, l, c) = fixture();
        let tr = true_range_series(&h, &l, &c);
        let period = 3;
        let series = atr_series(&tr, period, AtrVariant::Sma);
        let expected = (tr[1] + tr[2] + tr[3]) / 3.0;
        assert!((series[3].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn insufficient_bars_yield_none() {
        let tr = vec![1.0, 2.0];
        let series = atr_series(&tr, 14, AtrVariant::Wilder);
        assert!(series.iter().all(|v| v.is_none()));
    }
}

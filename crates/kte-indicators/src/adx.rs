//! Average Directional Index, Wilder-smoothed (spec §3, GLOSSARY).

use crate::atr::true_range_series;

fn directional_movement(highs: &[f64], lows: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = highs.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }
    (plus_dm, minus_dm)
}

/// Wilder running-sum smoothing (the same recurrence ATR uses): seed is the
/// sum of the first `period` values, then each step is
/// `prev - prev/period + new`.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let seed: f64 = values[0..period].iter().sum();
    out[period - 1] = Some(seed);
    let mut prev = seed;
    for (i, v) in values.iter().enumerate().skip(period) {
        let cur = prev - (prev / period as f64) + v;
        out[i] = Some(cur);
        prev = cur;
    }
    out
}

/// Computes the ADX series. Requires at least `2*period` bars for the first
/// valid value (one `period` to seed +DI/-DI/TR, another to seed the DX
/// smoothing), matching the standard Wilder construction.
pub fn adx_series(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = highs.len();
    let mut out = vec![None; n];
    if period == 0 || n == 0 {
        return out;
    }

    let tr = true_range_series(highs, lows, closes);
    let (plus_dm, minus_dm) = directional_movement(highs, lows);

    let smoothed_tr = wilder_smooth(&tr, period);
    let smoothed_plus = wilder_smooth(&plus_dm, period);
    let smoothed_minus = wilder_smooth(&minus_dm, period);

    let mut dx: Vec<Option<f64>> = vec![None; n];
    for i in 0..n {
        if let (Some(str_), Some(spl), Some(smi)) = (smoothed_tr[i], smoothed_plus[i], smoothed_minus[i]) {
            if str_ <= 0.0 {
                dx[i] = Some(0.0);
                continue;
            }
            let plus_di = 100.0 * spl / str_;
            let minus_di = 100.0 * smi / str_;
            let sum = plus_di + minus_di;
            dx[i] = if sum == 0.0 {
                Some(0.0)
            } else {
                Some(100.0 * (plus_di - minus_di).abs() / sum)
            };
        }
    }

    // ADX is the Wilder-smoothed (as a moving average, not running sum) DX:
    // seed = mean of the first `period` available DX values, then
    // ADX[i] = (ADX[i-1]*(period-1) + DX[i]) / period.
    let first_dx_idx = dx.iter().position(|v| v.is_some());
    if let Some(start) = first_dx_idx {
        if start + period <= n {
            let seed_window = &dx[start..start + period];
            if seed_window.iter().all(|v| v.is_some()) {
                let seed_sum: f64 = seed_window.iter().map(|v| v.unwrap()).sum();
                let seed = seed_sum / period as f64;
                let seed_idx = start + period - 1;
                out[seed_idx] = Some(seed);
                let mut prev = seed;
                for i in (seed_idx + 1)..n {
                    if let Some(dx_i) = dx[i] {
                        let cur = (prev * (period as f64 - 1.0) + dx_i) / period as f64;
                        out[i] = Some(cur);
                        prev = cur;
                    }
                }
            }
        }
    }
    out
}

//! Daily OHLCV bar and an ordered, deduplicated series.

use crate::money::Money;
use chrono::NaiveDate;

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: i64,
}

/// Bars ordered by date ascending, unique by date (spec §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from an unordered, possibly-duplicated slice: sorts
    /// ascending by date and keeps the last bar seen for any repeated date
    /// (mirrors the broker client's "duplicates removed, sorted ascending"
    /// contract in spec §4.2).
    pub fn from_unordered(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        BarSeries { bars: deduped }
    }

    pub fn push(&mut self, bar: Bar) {
        match self.bars.last() {
            Some(last) if last.date == bar.date => {
                let idx = self.bars.len() - 1;
                self.bars[idx] = bar;
            }
            Some(last) if last.date > bar.date => {
                // Out-of-order append: fall back to a full re-sort/dedup.
                self.bars.push(bar);
                *self = BarSeries::from_unordered(std::mem::take(&mut self.bars));
            }
            _ => self.bars.push(bar),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// The bar before the most recent one, if present.
    pub fn previous(&self) -> Option<&Bar> {
        if self.bars.len() < 2 {
            None
        } else {
            self.bars.get(self.bars.len() - 2)
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close.as_f64()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: i64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: Money::from_major(close),
            high: Money::from_major(close),
            low: Money::from_major(close),
            close: Money::from_major(close),
            volume: 100,
        }
    }

    #[test]
    fn sorts_ascending_and_dedupes_by_date() {
        let series = BarSeries::from_unordered(vec![
            bar(2026, 1, 3, 100),
            bar(2026, 1, 1, 90),
            bar(2026, 1, 3, 105), // duplicate date: last wins
            bar(2026, 1, 2, 95),
        ]);
        assert_eq!(series.len(), 3);
        let closes: Vec<i64> = series.as_slice().iter().map(|b| b.close.minor() / 100).collect();
        assert_eq!(closes, vec![90, 95, 105]);
    }

    #[test]
    fn previous_is_none_for_single_bar() {
        let series = BarSeries::from_unordered(vec![bar(2026, 1, 1, 100)]);
        assert!(series.previous().is_none());
        assert!(series.last().is_some());
    }
}

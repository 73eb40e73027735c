//! `UniverseSelection` — per-trade-date universe snapshot (spec §3, §4.10).

use crate::symbol::Symbol;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SelectionMethod {
    Fixed,
    VolumeTop,
    AtrFilter,
    CombinedVolumeThenAtr,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UniverseSelection {
    pub date: NaiveDate,
    pub method: SelectionMethod,
    pub symbols: Vec<Symbol>,
    pub saved_at: DateTime<Utc>,
    pub market_open_refreshed: bool,
}

impl UniverseSelection {
    pub fn new(date: NaiveDate, method: SelectionMethod, symbols: Vec<Symbol>, saved_at: DateTime<Utc>) -> Self {
        UniverseSelection {
            date,
            method,
            symbols,
            saved_at,
            market_open_refreshed: false,
        }
    }

    /// A cached selection is valid to reuse only if it matches today's date.
    pub fn is_valid_for(&self, date: NaiveDate) -> bool {
        self.date == date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_valid_only_for_its_own_date() {
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 7, 21).unwrap();
        let sel = UniverseSelection::new(d1, SelectionMethod::Fixed, vec![], Utc::now());
        assert!(sel.is_valid_for(d1));
        assert!(!sel.is_valid_for(d2));
    }
}

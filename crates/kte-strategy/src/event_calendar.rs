//! Configured high-risk event dates (spec §4.6 entry condition 6): trading
//! days the operator has blacklisted in advance (earnings, macro releases).

use std::collections::BTreeSet;

use chrono::NaiveDate;

#[derive(Clone, Debug, Default)]
pub struct EventCalendar {
    blocked: BTreeSet<NaiveDate>,
}

impl EventCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        EventCalendar {
            blocked: dates.into_iter().collect(),
        }
    }

    pub fn is_blocked(&self, date: NaiveDate) -> bool {
        self.blocked.contains(&date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_calendar_blocks_nothing() {
        let cal = EventCalendar::default();
        assert!(!cal.is_blocked(NaiveDate::from_ymd_opt(2026, 7, 20).unwrap()));
    }

    #[test]
    fn listed_date_is_blocked() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let cal = EventCalendar::new([d]);
        assert!(cal.is_blocked(d));
    }
}

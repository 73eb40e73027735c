//! Market-hours clock (spec §4.1, C1).
//!
//! All time in the core flows through the [`Clock`] trait — no pure-logic
//! module ever calls a wall-clock function directly. This is what makes the
//! market-hours classifier (and everything downstream of it) deterministic
//! and testable with a frozen clock (spec §9 design note on mixed time
//! semantics).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;

/// Injectable source of "now", always KST-aware downstream.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_kst(&self) -> DateTime<Tz> {
        self.now_utc().with_timezone(&Seoul)
    }
}

/// The real wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A deterministic, test-only frozen clock.
#[derive(Clone, Copy, Debug)]
pub struct FrozenClock(pub DateTime<Utc>);

impl Clock for FrozenClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Injectable holiday calendar — the KR holiday table is supplied by the
/// caller so tests can run with a frozen, known set of dates (spec §4.1).
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// A holiday calendar backed by a fixed set of dates.
#[derive(Clone, Debug, Default)]
pub struct FixedHolidayCalendar {
    holidays: std::collections::BTreeSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        FixedHolidayCalendar {
            holidays: holidays.into_iter().collect(),
        }
    }
}

impl HolidayCalendar for FixedHolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarketStatus {
    Closed,
    PreOpenAuction,
    Open,
    CloseAuction,
}

/// Classifies an instant into a [`MarketStatus`] and answers whether new
/// orders may be placed right now (spec §4.1).
pub struct MarketHoursClock<C: Clock, H: HolidayCalendar> {
    clock: C,
    calendar: H,
}

impl<C: Clock, H: HolidayCalendar> MarketHoursClock<C, H> {
    pub fn new(clock: C, calendar: H) -> Self {
        MarketHoursClock { clock, calendar }
    }

    pub fn status_now(&self) -> MarketStatus {
        self.status_at(self.clock.now_kst())
    }

    pub fn status_at(&self, kst_instant: DateTime<Tz>) -> MarketStatus {
        let date = kst_instant.date_naive();
        if is_weekend(&kst_instant) || self.calendar.is_holiday(date) {
            return MarketStatus::Closed;
        }
        let secs = time_of_day_secs(&kst_instant);
        const PRE_OPEN: i64 = 8 * 3600 + 30 * 60; // 08:30
        const OPEN: i64 = 9 * 3600; // 09:00
        const CLOSE: i64 = 15 * 3600 + 20 * 60; // 15:20
        const CLOSE_AUCTION_END: i64 = 15 * 3600 + 30 * 60; // 15:30

        if secs >= PRE_OPEN && secs < OPEN {
            MarketStatus::PreOpenAuction
        } else if secs >= OPEN && secs < CLOSE {
            MarketStatus::Open
        } else if secs >= CLOSE && secs < CLOSE_AUCTION_END {
            MarketStatus::CloseAuction
        } else {
            MarketStatus::Closed
        }
    }

    /// `tradeable` is true only in OPEN, except emergency SELL which may also
    /// attempt during CLOSE_AUCTION (spec §4.1/§4.7). Entry orders never may.
    pub fn tradeable(&self, is_emergency_sell: bool) -> (bool, &'static str) {
        match self.status_now() {
            MarketStatus::Open => (true, "market open"),
            MarketStatus::CloseAuction if is_emergency_sell => {
                (true, "close auction: emergency exit permitted")
            }
            MarketStatus::CloseAuction => (false, "close auction: entries and non-emergency exits blocked"),
            MarketStatus::PreOpenAuction => (false, "pre-open auction"),
            MarketStatus::Closed => (false, "market closed"),
        }
    }

    /// Duration until the next OPEN, scanning forward day by day (bounded to
    /// avoid an unbounded loop if the calendar is pathological).
    pub fn time_to_next_open(&self) -> chrono::Duration {
        let now = self.clock.now_kst();
        if self.status_at(now) == MarketStatus::Open {
            return chrono::Duration::zero();
        }
        let today_open = Seoul
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 9, 0, 0)
            .single()
            .expect("valid KST instant");
        if now < today_open && self.status_at(today_open) != MarketStatus::Closed {
            return today_open.signed_duration_since(now);
        }
        let mut day = now.date_naive().succ_opt().expect("date overflow");
        for _ in 0..14 {
            let candidate = Seoul
                .with_ymd_and_hms(day.year(), day.month(), day.day(), 9, 0, 0)
                .single()
                .expect("valid KST instant");
            if !is_weekend(&candidate) && !self.calendar.is_holiday(day) {
                return candidate.signed_duration_since(now);
            }
            day = day.succ_opt().expect("date overflow");
        }
        chrono::Duration::days(14)
    }
}

fn is_weekend(instant: &DateTime<Tz>) -> bool {
    matches!(
        instant.weekday(),
        chrono::Weekday::Sat | chrono::Weekday::Sun
    )
}

fn time_of_day_secs(instant: &DateTime<Tz>) -> i64 {
    use chrono::Timelike;
    instant.hour() as i64 * 3600 + instant.minute() as i64 * 60 + instant.second() as i64
}

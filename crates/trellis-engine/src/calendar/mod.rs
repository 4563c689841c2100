//! Working-time calendar collaborator.
//!
//! The scheduler treats the calendar as an opaque function set: it asks
//! whether an instant is working time, where the next working instant
//! is, and what date results from adding a working-minute duration.
//! Deployments plug in their own holiday-aware implementation;
//! [`WeekdayCalendar`] ships for tests and the demo binary.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};

pub trait WorkCalendar: Send + Sync {
    fn is_working_instant(&self, t: DateTime<Utc>) -> bool;

    /// `t` itself when it is working time, otherwise the earliest
    /// working instant after `t`.
    fn next_working_instant(&self, t: DateTime<Utc>) -> DateTime<Utc>;

    /// End instant of `minutes` working minutes starting at (or after)
    /// `start`, skipping non-working time.
    fn add_working_duration(&self, start: DateTime<Utc>, minutes: u32) -> DateTime<Utc>;
}

/// Monday-to-Friday calendar with a fixed daily working window.
#[derive(Debug, Clone, Copy)]
pub struct WeekdayCalendar {
    /// Minutes after midnight UTC at which the working day opens.
    day_start_min: u32,
    /// Length of the working day in minutes.
    day_length_min: u32,
}

impl WeekdayCalendar {
    /// 09:00–17:00 UTC, five days a week.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            day_start_min: 9 * 60,
            day_length_min: 8 * 60,
        }
    }

    #[must_use]
    pub fn with_hours(day_start_min: u32, day_length_min: u32) -> Self {
        debug_assert!(day_start_min + day_length_min <= 24 * 60);
        Self {
            day_start_min,
            day_length_min,
        }
    }

    fn is_working_day(day: Weekday) -> bool {
        !matches!(day, Weekday::Sat | Weekday::Sun)
    }

    fn minute_of_day(t: DateTime<Utc>) -> u32 {
        t.hour() * 60 + t.minute()
    }

    /// Opening instant of the first working day at or after `t`'s date.
    fn day_open(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = t.date_naive();
        while !Self::is_working_day(date.weekday()) {
            date = date.succ_opt().expect("date within chrono range");
        }
        date.and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc()
            + Duration::minutes(i64::from(self.day_start_min))
    }

    /// Working minutes remaining in `t`'s day, assuming `t` is working time.
    fn remaining_today(&self, t: DateTime<Utc>) -> u32 {
        let elapsed = Self::minute_of_day(t) - self.day_start_min;
        self.day_length_min - elapsed
    }
}

impl WorkCalendar for WeekdayCalendar {
    fn is_working_instant(&self, t: DateTime<Utc>) -> bool {
        if !Self::is_working_day(t.weekday()) {
            return false;
        }
        let minute = Self::minute_of_day(t);
        minute >= self.day_start_min && minute < self.day_start_min + self.day_length_min
    }

    fn next_working_instant(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_working_instant(t) {
            return t;
        }
        let minute = Self::minute_of_day(t);
        if Self::is_working_day(t.weekday()) && minute < self.day_start_min {
            return self.day_open(t);
        }
        // Past closing, or a weekend: open of the next working day.
        let next_day = t.date_naive().succ_opt().expect("date within chrono range");
        self.day_open(
            next_day
                .and_hms_opt(0, 0, 0)
                .expect("midnight exists")
                .and_utc(),
        )
    }

    fn add_working_duration(&self, start: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
        let mut cursor = self.next_working_instant(start);
        let mut remaining = minutes;
        while remaining > 0 {
            let available = self.remaining_today(cursor);
            let take = remaining.min(available);
            cursor += Duration::minutes(i64::from(take));
            remaining -= take;
            if remaining > 0 {
                cursor = self.next_working_instant(cursor);
            }
        }
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cal() -> WeekdayCalendar {
        WeekdayCalendar::standard()
    }

    // 2024-03-04 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    #[test]
    fn working_instant_inside_window() {
        assert!(cal().is_working_instant(monday(9, 0)));
        assert!(cal().is_working_instant(monday(16, 59)));
        assert!(!cal().is_working_instant(monday(17, 0)));
        assert!(!cal().is_working_instant(monday(8, 59)));
    }

    #[test]
    fn weekend_rolls_to_monday() {
        let saturday = Utc.with_ymd_and_hms(2024, 3, 2, 11, 0, 0).unwrap();
        assert_eq!(cal().next_working_instant(saturday), monday(9, 0));
    }

    #[test]
    fn after_hours_rolls_to_next_morning() {
        let late = monday(18, 30);
        let tuesday_open = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        assert_eq!(cal().next_working_instant(late), tuesday_open);
    }

    #[test]
    fn duration_spans_days() {
        // 12h of work from Monday 09:00: 8h Monday + 4h Tuesday.
        let end = cal().add_working_duration(monday(9, 0), 12 * 60);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 5, 13, 0, 0).unwrap());
    }

    #[test]
    fn duration_spans_weekend() {
        // Friday 16:00 + 2h: 1h Friday, 1h Monday.
        let friday = Utc.with_ymd_and_hms(2024, 3, 8, 16, 0, 0).unwrap();
        let end = cal().add_working_duration(friday, 120);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap());
    }

    #[test]
    fn zero_duration_snaps_to_working_time() {
        let saturday = Utc.with_ymd_and_hms(2024, 3, 2, 11, 0, 0).unwrap();
        assert_eq!(cal().add_working_duration(saturday, 0), monday(9, 0));
    }
}

//! Calendar-interval arithmetic shared by the reminder and recurrence
//! schedulers. All functions are pure and operate in UTC; "is it the day to
//! act" comparisons work at calendar-day granularity, never on raw
//! timestamps.

use chrono::{DateTime, Datelike, Duration, Months, Utc};

use crate::task::Interval;

/// Advance `date` by `n` steps of `interval`. Quarterly steps are three
/// calendar months; month-based steps clamp to the end of shorter months.
/// `Ongoing` has no step and leaves the date unchanged.
pub fn add_interval(date: DateTime<Utc>, interval: Interval, n: u32) -> DateTime<Utc> {
    match interval {
        Interval::Daily => date + Duration::days(i64::from(n)),
        Interval::Weekly => date + Duration::weeks(i64::from(n)),
        Interval::Monthly => add_months(date, n),
        Interval::Quarterly => add_months(date, 3 * n),
        Interval::Yearly => add_months(date, 12 * n),
        Interval::Ongoing => date,
    }
}

fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Calendar-date equality in UTC.
pub fn is_same_calendar_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

/// The interval-unit distance from `today` to `end`, in the unit named by
/// `interval`. This is the reminder selection predicate: a task qualifies
/// when the offset equals its configured step count. `Ongoing` never
/// qualifies.
pub fn reminder_offset(today: DateTime<Utc>, end: DateTime<Utc>, interval: Interval) -> Option<i64> {
    let days = (end.date_naive() - today.date_naive()).num_days();
    match interval {
        Interval::Daily => Some(days),
        Interval::Weekly => Some(days.div_euclid(7)),
        Interval::Monthly => Some(round_to_unit(days, 365.24 / 12.0)),
        Interval::Quarterly => Some(round_to_unit(days, 3.0 * 365.24 / 12.0)),
        Interval::Yearly => Some(whole_years_between(today, end)),
        Interval::Ongoing => None,
    }
}

fn round_to_unit(days: i64, days_per_unit: f64) -> i64 {
    (days as f64 / days_per_unit).round() as i64
}

/// Complete calendar years between two dates, signed.
fn whole_years_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut years = i64::from(to.year()) - i64::from(from.year());
    let from_md = (from.month(), from.day());
    let to_md = (to.month(), to.day());
    if years > 0 && to_md < from_md {
        years -= 1;
    }
    if years < 0 && to_md > from_md {
        years += 1;
    }
    years
}

//! Date arithmetic for habit schedules.
//!
//! All dates are calendar dates without a time zone; "today" is supplied by
//! the caller so the rules stay deterministic.

use chrono::{Datelike, Duration, NaiveDate};

use crate::domains::Frequency;

/// Upper bound for forward searches in [`next_due_on`].
const MAX_LOOKAHEAD_DAYS: i64 = 366 * 4;

/// Weekday index with Sunday as 0 and Saturday as 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Signed whole days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// Whether a habit with `rule`, started on `start_date`, is scheduled on
/// `target`. A missing start date counts as starting on `target`.
pub fn is_scheduled_on(rule: &Frequency, start_date: Option<NaiveDate>, target: NaiveDate) -> bool {
    match rule {
        Frequency::Daily => true,
        Frequency::DaysOfWeek { days } => days.contains(&weekday_index(target)),
        Frequency::EveryXDays { interval_days } => {
            if *interval_days == 0 {
                return false;
            }
            let start = start_date.unwrap_or(target);
            let elapsed = days_between(start, target);
            elapsed >= 0 && elapsed % i64::from(*interval_days) == 0
        }
    }
}

/// First scheduled date strictly after `after`, searching a bounded window.
pub fn next_due_on(
    rule: &Frequency,
    start_date: Option<NaiveDate>,
    after: NaiveDate,
) -> Option<NaiveDate> {
    // Pin a missing start to `after` so interval rules keep a fixed phase.
    let start = start_date.or(Some(after));
    (1..=MAX_LOOKAHEAD_DAYS)
        .map(|offset| after + Duration::days(offset))
        .find(|candidate| is_scheduled_on(rule, start, *candidate))
}

/// The `n` dates ending at `anchor`, newest first.
pub fn last_n_dates(n: usize, anchor: NaiveDate) -> Vec<NaiveDate> {
    (0..n as i64)
        .map(|offset| anchor - Duration::days(offset))
        .collect()
}

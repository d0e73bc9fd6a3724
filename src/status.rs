//! Effective (displayed) status of a habit for a given day.
//!
//! The stored status, the last completion date and whether the habit was
//! marked today drive the result, so a habit skipped several cycles ago keeps
//! showing its stale status until the rule makes it due again. That
//! approximation is intentional: the completion history is never replayed to
//! synthesise missing days.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::domains::{Frequency, Habit, HabitStatus};
use crate::recurrence::{days_between, is_scheduled_on, weekday_index};

const MAX_STREAK_LOOKBACK_DAYS: usize = 366;

/// Sub-habit statuses keyed by sub-habit id.
pub type SubHabitStatuses = HashMap<String, HabitStatus>;

/// The outcome recorded for `day`, if the habit was marked on it.
pub fn marked_on(habit: &Habit, day: NaiveDate) -> Option<HabitStatus> {
    habit
        .completion_history
        .iter()
        .find(|entry| entry.date == day)
        .map(|entry| entry.status)
}

/// Status derived from the stored status, the last completion date and the
/// recurrence rule, ignoring sub-habits.
pub fn base_status(habit: &Habit, today: NaiveDate) -> HabitStatus {
    let stored = habit.status;
    // Acted on today: whatever was marked stands.
    if let Some(marked) = marked_on(habit, today) {
        return marked;
    }
    let Some(last_completed) = habit.last_completed_on else {
        return stored;
    };
    if last_completed == today {
        return stored;
    }

    let due_again = match &habit.frequency {
        Frequency::Daily => true,
        Frequency::EveryXDays { interval_days } => {
            *interval_days > 0 && days_between(last_completed, today) >= i64::from(*interval_days)
        }
        Frequency::DaysOfWeek { days } => days.contains(&weekday_index(today)),
    };

    if due_again {
        HabitStatus::NotStarted
    } else {
        stored
    }
}

/// Folds sub-habit statuses into one. Missing entries count as not started.
/// Returns `None` when there is nothing to aggregate or nothing was touched.
pub fn aggregate_sub_statuses(habit: &Habit, sub_statuses: &SubHabitStatuses) -> Option<HabitStatus> {
    if habit.sub_habits.is_empty() {
        return None;
    }
    let statuses: Vec<HabitStatus> = habit
        .sub_habits
        .iter()
        .map(|sub| sub_statuses.get(&sub.id).copied().unwrap_or_default())
        .collect();

    if statuses.iter().all(|status| *status == HabitStatus::Completed) {
        return Some(HabitStatus::Completed);
    }
    if statuses.iter().all(|status| *status == HabitStatus::Skipped) {
        return Some(HabitStatus::Skipped);
    }
    if statuses.iter().any(|status| *status != HabitStatus::NotStarted) {
        return Some(HabitStatus::Ongoing);
    }
    None
}

/// The status to display for `habit` on `today`.
pub fn effective_status(
    habit: &Habit,
    today: NaiveDate,
    sub_statuses: &SubHabitStatuses,
) -> HabitStatus {
    aggregate_sub_statuses(habit, sub_statuses).unwrap_or_else(|| base_status(habit, today))
}

/// Effective statuses keyed by habit id.
pub fn status_map(
    habits: &[Habit],
    today: NaiveDate,
    sub_statuses: &SubHabitStatuses,
) -> HashMap<String, HabitStatus> {
    habits
        .iter()
        .map(|habit| (habit.id.clone(), effective_status(habit, today, sub_statuses)))
        .collect()
}

/// Dates on which the habit is known to have been completed.
pub fn completed_dates(habit: &Habit) -> BTreeSet<NaiveDate> {
    let mut dates: BTreeSet<NaiveDate> = habit
        .completion_history
        .iter()
        .filter(|entry| entry.status == HabitStatus::Completed)
        .map(|entry| entry.date)
        .collect();
    if let Some(last) = habit.last_completed_on {
        // A later re-mark of the same day wins over the completion date.
        if marked_on(habit, last).map_or(true, |status| status == HabitStatus::Completed) {
            dates.insert(last);
        }
    }
    dates
}

/// Consecutive scheduled days completed, counting back from `today`. An
/// unfinished `today` does not break the streak.
pub fn current_streak(habit: &Habit, today: NaiveDate) -> u32 {
    let completed = completed_dates(habit);
    let Some(earliest) = completed.first().copied() else {
        return 0;
    };
    let start = habit.start_date.unwrap_or(earliest);

    let mut streak = 0;
    let mut cursor = today;
    for _ in 0..MAX_STREAK_LOOKBACK_DAYS {
        if cursor < start {
            break;
        }
        if is_scheduled_on(&habit.frequency, Some(start), cursor) {
            if completed.contains(&cursor) {
                streak += 1;
            } else if cursor != today {
                break;
            }
        }
        match cursor.pred_opt() {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    streak
}

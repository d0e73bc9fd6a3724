use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::domains::{Habit, HabitStatus, Purpose, System};
use crate::recurrence::{is_scheduled_on, last_n_dates};
use crate::status::completed_dates;

const WEEKLY_WINDOW_DAYS: usize = 7;
const RANKING_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub completed: u32,
    pub total: u32,
}

impl Bucket {
    fn add(&mut self, completed: bool) {
        self.total += 1;
        if completed {
            self.completed += 1;
        }
    }

    pub fn percent(&self) -> u32 {
        percent(self.completed, self.total)
    }
}

/// Rounded completion percentage; zero when there is nothing to count.
pub fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(completed) / f64::from(total)) * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCompletion {
    pub system_id: String,
    pub name: String,
    pub color: String,
    pub completed: u32,
    pub total: u32,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeCompletion {
    pub purpose: Purpose,
    pub completed: u32,
    pub total: u32,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub label: String,
    pub full_label: String,
    pub completion_rate: u32,
    pub completed_habits: u32,
    pub total_habits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHabit {
    pub habit_id: String,
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitRankings {
    pub most_completed: Vec<RankedHabit>,
    pub most_skipped: Vec<RankedHabit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBreakdown {
    pub by_purpose: Vec<PurposeCompletion>,
    pub by_system: Vec<SystemCompletion>,
    pub days_counted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub date: NaiveDate,
    pub today: Bucket,
    pub today_percent: u32,
    pub by_system: Vec<SystemCompletion>,
    pub by_purpose: Vec<PurposeCompletion>,
    pub trend: Vec<TrendPoint>,
    pub weekly: WeeklyBreakdown,
    pub rankings: HabitRankings,
}

fn system_rows(systems: &[System], buckets: &HashMap<&str, Bucket>) -> Vec<SystemCompletion> {
    systems
        .iter()
        .map(|system| {
            let bucket = buckets.get(system.id.as_str()).copied().unwrap_or_default();
            SystemCompletion {
                system_id: system.id.clone(),
                name: system.name.clone(),
                color: system.color.clone(),
                completed: bucket.completed,
                total: bucket.total,
                percent: bucket.percent(),
            }
        })
        .collect()
}

fn purpose_rows(buckets: &HashMap<Purpose, Bucket>) -> Vec<PurposeCompletion> {
    Purpose::ALL
        .into_iter()
        .map(|purpose| {
            let bucket = buckets.get(&purpose).copied().unwrap_or_default();
            PurposeCompletion {
                purpose,
                completed: bucket.completed,
                total: bucket.total,
                percent: bucket.percent(),
            }
        })
        .collect()
}

/// Completion per system over the given status map. Habits whose system is
/// unknown are ignored.
pub fn completion_by_system(
    habits: &[Habit],
    systems: &[System],
    statuses: &HashMap<String, HabitStatus>,
) -> Vec<SystemCompletion> {
    let mut buckets: HashMap<&str, Bucket> = systems
        .iter()
        .map(|system| (system.id.as_str(), Bucket::default()))
        .collect();
    for habit in habits {
        if let Some(bucket) = buckets.get_mut(habit.system_id.as_str()) {
            bucket.add(statuses.get(&habit.id) == Some(&HabitStatus::Completed));
        }
    }
    system_rows(systems, &buckets)
}

/// Completion per purpose over the given status map. Habits without a
/// purpose are ignored.
pub fn completion_by_purpose(
    habits: &[Habit],
    statuses: &HashMap<String, HabitStatus>,
) -> Vec<PurposeCompletion> {
    let mut buckets: HashMap<Purpose, Bucket> = HashMap::new();
    for habit in habits {
        if let Some(purpose) = habit.purpose {
            buckets
                .entry(purpose)
                .or_default()
                .add(statuses.get(&habit.id) == Some(&HabitStatus::Completed));
        }
    }
    purpose_rows(&buckets)
}

/// Daily completion rate over the last `days` days, oldest first.
pub fn completion_trend(habits: &[Habit], today: NaiveDate, days: usize) -> Vec<TrendPoint> {
    let days = days.max(1);
    let completed: Vec<_> = habits.iter().map(completed_dates).collect();

    (0..days as i64)
        .rev()
        .map(|offset| {
            let day = today - Duration::days(offset);
            let mut bucket = Bucket::default();
            for (habit, done) in habits.iter().zip(&completed) {
                if is_scheduled_on(&habit.frequency, habit.start_date, day) {
                    bucket.add(done.contains(&day));
                }
            }
            TrendPoint {
                date: day,
                label: day.format("%a").to_string(),
                full_label: day.format("%a, %b %-d").to_string(),
                completion_rate: bucket.percent(),
                completed_habits: bucket.completed,
                total_habits: bucket.total,
            }
        })
        .collect()
}

/// Per-purpose and per-system completion across the seven days ending at
/// `anchor`, counting each scheduled habit-day once.
pub fn weekly_breakdown(habits: &[Habit], systems: &[System], anchor: NaiveDate) -> WeeklyBreakdown {
    let dates = last_n_dates(WEEKLY_WINDOW_DAYS, anchor);
    let mut by_purpose: HashMap<Purpose, Bucket> = HashMap::new();
    let mut by_system: HashMap<&str, Bucket> = systems
        .iter()
        .map(|system| (system.id.as_str(), Bucket::default()))
        .collect();

    for habit in habits {
        let done = completed_dates(habit);
        for day in &dates {
            if !is_scheduled_on(&habit.frequency, habit.start_date, *day) {
                continue;
            }
            let is_complete = done.contains(day);
            if let Some(purpose) = habit.purpose {
                by_purpose.entry(purpose).or_default().add(is_complete);
            }
            if let Some(bucket) = by_system.get_mut(habit.system_id.as_str()) {
                bucket.add(is_complete);
            }
        }
    }

    WeeklyBreakdown {
        by_purpose: purpose_rows(&by_purpose),
        by_system: system_rows(systems, &by_system),
        days_counted: dates.len(),
    }
}

fn count_outcomes(
    habit: &Habit,
    status: HabitStatus,
    today_status: Option<HabitStatus>,
    today: NaiveDate,
) -> u32 {
    let mut count = habit
        .completion_history
        .iter()
        .filter(|entry| entry.status == status && entry.date != today)
        .count() as u32;
    if today_status == Some(status) {
        count += 1;
    }
    count
}

fn top_ranked(mut ranked: Vec<RankedHabit>) -> Vec<RankedHabit> {
    ranked.retain(|item| item.count > 0);
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(RANKING_SIZE);
    ranked
}

/// Top habits by recorded completions and by recorded skips. Today's
/// effective status stands in for any history entry dated today.
pub fn rank_habits(
    habits: &[Habit],
    statuses: &HashMap<String, HabitStatus>,
    today: NaiveDate,
) -> HabitRankings {
    let rank = |status: HabitStatus| {
        habits
            .iter()
            .map(|habit| RankedHabit {
                habit_id: habit.id.clone(),
                name: habit.name.clone(),
                count: count_outcomes(habit, status, statuses.get(&habit.id).copied(), today),
            })
            .collect::<Vec<_>>()
    };

    HabitRankings {
        most_completed: top_ranked(rank(HabitStatus::Completed)),
        most_skipped: top_ranked(rank(HabitStatus::Skipped)),
    }
}

/// Everything the analytics view shows, computed for `today`.
pub fn summarize(
    habits: &[Habit],
    systems: &[System],
    statuses: &HashMap<String, HabitStatus>,
    today: NaiveDate,
    trend_days: usize,
) -> AnalyticsSummary {
    let mut today_bucket = Bucket::default();
    for habit in habits
        .iter()
        .filter(|habit| is_scheduled_on(&habit.frequency, habit.start_date, today))
    {
        today_bucket.add(statuses.get(&habit.id) == Some(&HabitStatus::Completed));
    }

    AnalyticsSummary {
        date: today,
        today: today_bucket,
        today_percent: today_bucket.percent(),
        by_system: completion_by_system(habits, systems, statuses),
        by_purpose: completion_by_purpose(habits, statuses),
        trend: completion_trend(habits, today, trend_days),
        weekly: weekly_breakdown(habits, systems, today),
        rankings: rank_habits(habits, statuses, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn system(id: &str, name: &str) -> System {
        let mut system = System::new(name);
        system.id = id.to_string();
        system
    }

    fn habit(id: &str, system_id: &str, purpose: Option<Purpose>) -> Habit {
        let mut habit = Habit::new(system_id, id, Frequency::Daily);
        habit.id = id.to_string();
        habit.purpose = purpose;
        habit
    }

    #[test]
    fn percent_rounds_and_handles_empty() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn by_system_counts_only_known_systems() {
        let systems = vec![system("s1", "Body"), system("s2", "Mind")];
        let habits = vec![
            habit("h1", "s1", None),
            habit("h2", "s1", None),
            habit("h3", "s2", None),
            habit("h4", "gone", None),
        ];
        let statuses: HashMap<String, HabitStatus> = [
            ("h1".to_string(), HabitStatus::Completed),
            ("h2".to_string(), HabitStatus::Skipped),
            ("h4".to_string(), HabitStatus::Completed),
        ]
        .into_iter()
        .collect();

        let rows = completion_by_system(&habits, &systems, &statuses);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].completed, rows[0].total, rows[0].percent), (1, 2, 50));
        assert_eq!((rows[1].completed, rows[1].total, rows[1].percent), (0, 1, 0));
    }

    #[test]
    fn by_purpose_lists_every_purpose() {
        let habits = vec![habit("h1", "s1", Some(Purpose::Body)), habit("h2", "s1", None)];
        let statuses: HashMap<String, HabitStatus> =
            [("h1".to_string(), HabitStatus::Completed)].into_iter().collect();
        let rows = completion_by_purpose(&habits, &statuses);
        assert_eq!(rows.len(), Purpose::ALL.len());
        let body = rows.iter().find(|row| row.purpose == Purpose::Body).unwrap();
        assert_eq!((body.completed, body.total, body.percent), (1, 1, 100));
    }

    #[test]
    fn trend_is_oldest_first_and_uses_history() {
        let mut h1 = habit("h1", "s1", None);
        h1.record_outcome(date(2024, 1, 2), HabitStatus::Completed);
        h1.last_completed_on = Some(date(2024, 1, 3));
        let mut h2 = habit("h2", "s1", None);
        h2.frequency = Frequency::every_x_days(2);
        h2.start_date = Some(date(2024, 1, 1));

        let trend = completion_trend(&[h1, h2], date(2024, 1, 3), 3);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].date, date(2024, 1, 1));
        assert_eq!(trend[0].label, "Mon");
        assert_eq!((trend[0].completed_habits, trend[0].total_habits), (0, 2));
        assert_eq!((trend[1].completed_habits, trend[1].total_habits), (1, 1));
        assert_eq!(trend[1].completion_rate, 100);
        assert_eq!((trend[2].completed_habits, trend[2].total_habits), (1, 2));
        assert_eq!(trend[2].full_label, "Wed, Jan 3");
    }

    #[test]
    fn weekly_breakdown_counts_scheduled_days() {
        let systems = vec![system("s1", "Body")];
        let mut h1 = habit("h1", "s1", Some(Purpose::Body));
        h1.record_outcome(date(2024, 1, 7), HabitStatus::Completed);
        h1.record_outcome(date(2024, 1, 6), HabitStatus::Skipped);

        let weekly = weekly_breakdown(&[h1], &systems, date(2024, 1, 7));
        assert_eq!(weekly.days_counted, 7);
        assert_eq!((weekly.by_system[0].completed, weekly.by_system[0].total), (1, 7));
        let body = weekly
            .by_purpose
            .iter()
            .find(|row| row.purpose == Purpose::Body)
            .unwrap();
        assert_eq!(body.total, 7);
    }

    #[test]
    fn rankings_prefer_higher_counts() {
        let today = date(2024, 1, 7);
        let mut h1 = habit("h1", "s1", None);
        h1.record_outcome(date(2024, 1, 5), HabitStatus::Completed);
        let mut h2 = habit("h2", "s1", None);
        h2.record_outcome(date(2024, 1, 5), HabitStatus::Completed);
        h2.record_outcome(date(2024, 1, 6), HabitStatus::Skipped);
        let h3 = habit("h3", "s1", None);
        let statuses: HashMap<String, HabitStatus> =
            [("h2".to_string(), HabitStatus::Completed)].into_iter().collect();

        let rankings = rank_habits(&[h1, h2, h3], &statuses, today);
        assert_eq!(rankings.most_completed[0].habit_id, "h2");
        assert_eq!(rankings.most_completed[0].count, 2);
        assert_eq!(rankings.most_completed.len(), 2);
        assert_eq!(rankings.most_skipped.len(), 1);
    }

    #[test]
    fn summary_reports_today_completion() {
        let systems = vec![system("s1", "Body")];
        let habits = vec![habit("h1", "s1", None), habit("h2", "s1", None)];
        let statuses: HashMap<String, HabitStatus> =
            [("h1".to_string(), HabitStatus::Completed)].into_iter().collect();
        let summary = summarize(&habits, &systems, &statuses, date(2024, 1, 7), 7);
        assert_eq!(summary.today, Bucket { completed: 1, total: 2 });
        assert_eq!(summary.today_percent, 50);
        assert_eq!(summary.trend.len(), 7);
    }
}

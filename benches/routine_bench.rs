use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use routine_os::analytics;
use routine_os::domains::{Frequency, Habit, HabitStatus, SubHabit, System};
use routine_os::recurrence::is_scheduled_on;
use routine_os::status::{effective_status, status_map};

fn fixture(count: usize, start: NaiveDate) -> (Vec<System>, Vec<Habit>, HashMap<String, HabitStatus>) {
    let systems: Vec<System> = ["Body", "Mind", "Home", "Money"]
        .into_iter()
        .map(System::new)
        .collect();
    let mut sub_statuses = HashMap::new();
    let habits = (0..count)
        .map(|idx| {
            let frequency = match idx % 3 {
                0 => Frequency::Daily,
                1 => Frequency::days_of_week([1, 3, 5]),
                _ => Frequency::every_x_days(3),
            };
            let mut habit = Habit::new(systems[idx % systems.len()].id.clone(), format!("Habit {idx}"), frequency);
            habit.start_date = Some(start);
            for day in (0..60).filter(|day| (day + idx) % 4 != 0) {
                habit.record_outcome(start + Duration::days(day), HabitStatus::Completed);
            }
            if idx % 5 == 0 {
                for position in 0..3 {
                    let sub = SubHabit::new(habit.id.clone(), format!("Step {position}"), position);
                    if position == 0 {
                        sub_statuses.insert(sub.id.clone(), HabitStatus::Completed);
                    }
                    habit.sub_habits.push(sub);
                }
            }
            habit
        })
        .collect();
    (systems, habits, sub_statuses)
}

fn bench_routine(c: &mut Criterion) {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let today = start + Duration::days(59);
    let (systems, habits, sub_statuses) = fixture(200, start);

    let mut group = c.benchmark_group("routine");
    group.bench_function(BenchmarkId::new("is_scheduled_on", 365), |b| {
        let rule = Frequency::every_x_days(3);
        b.iter(|| {
            (0..365)
                .filter(|offset| is_scheduled_on(&rule, Some(start), start + Duration::days(*offset)))
                .count()
        })
    });

    group.bench_function(BenchmarkId::new("effective_status", habits.len()), |b| {
        b.iter(|| {
            habits
                .iter()
                .filter(|habit| effective_status(habit, today, &sub_statuses) == HabitStatus::Completed)
                .count()
        })
    });

    group.bench_function(BenchmarkId::new("summarize", habits.len()), |b| {
        b.iter(|| {
            let statuses = status_map(&habits, today, &sub_statuses);
            analytics::summarize(&habits, &systems, &statuses, today, 7)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_routine);
criterion_main!(benches);

use chrono::NaiveDate;
use tempfile::tempdir;

use routine_os::domains::{
    CompletionEntry, Frequency, Habit, HabitStatus, Purpose, SubHabit, System, TimeBlock,
};
use routine_os::error::RoutineOsError;
use routine_os::interfaces::store::HabitStore;
use routine_os::store::SqliteHabitStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn open(dir: &tempfile::TempDir) -> SqliteHabitStore {
    let path = dir.path().join("habits.db").to_string_lossy().to_string();
    SqliteHabitStore::new(&path).await.unwrap()
}

fn sample_habit(system_id: &str) -> Habit {
    let mut habit = Habit::new(system_id, "Journal", Frequency::days_of_week([1, 3, 5]));
    habit.start_date = Some(date(2024, 1, 1));
    habit.duration_minutes = 15;
    habit.notes = "Before bed".to_string();
    habit.purpose = Some(Purpose::Mind);
    habit.preferred_time_block = Some(TimeBlock::Evening);
    habit.sub_habits = vec![SubHabit::new(habit.id.clone(), "Gratitude", 0)];
    habit
}

#[tokio::test]
async fn systems_and_habits_survive_reopening() {
    let dir = tempdir().unwrap();
    let mut system = System::new("Mind");
    system.order_index = 2;
    let habit = sample_habit(&system.id);
    {
        let store = open(&dir).await;
        store.upsert_system(&system).await.unwrap();
        store.upsert_habit(&habit).await.unwrap();
    }

    let store = open(&dir).await;
    let systems = store.list_systems().await.unwrap();
    assert_eq!(systems, vec![system.clone()]);
    let habits = store.list_habits().await.unwrap();
    assert_eq!(habits, vec![habit]);
}

#[tokio::test]
async fn upsert_replaces_existing_rows() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let mut system = System::new("Body");
    store.upsert_system(&system).await.unwrap();
    system.name = "Body & Health".to_string();
    system.color = "#0EA5E9".to_string();
    store.upsert_system(&system).await.unwrap();

    let systems = store.list_systems().await.unwrap();
    assert_eq!(systems.len(), 1);
    assert_eq!(systems[0].name, "Body & Health");
    assert_eq!(systems[0].color, "#0EA5E9");

    let mut habit = sample_habit(&system.id);
    store.upsert_habit(&habit).await.unwrap();
    habit.purpose = None;
    habit.frequency = Frequency::every_x_days(3);
    store.upsert_habit(&habit).await.unwrap();
    let habits = store.list_habits().await.unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0].purpose, None);
    assert_eq!(habits[0].frequency, Frequency::every_x_days(3));
}

#[tokio::test]
async fn status_updates_persist_history() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let system = System::new("Home");
    let habit = sample_habit(&system.id);
    store.upsert_system(&system).await.unwrap();
    store.upsert_habit(&habit).await.unwrap();

    let history = vec![
        CompletionEntry {
            date: date(2024, 1, 1),
            status: HabitStatus::Skipped,
        },
        CompletionEntry {
            date: date(2024, 1, 3),
            status: HabitStatus::Completed,
        },
    ];
    store
        .update_habit_status(&habit.id, HabitStatus::Completed, Some(date(2024, 1, 3)), &history)
        .await
        .unwrap();

    let stored = store.list_habits().await.unwrap().remove(0);
    assert_eq!(stored.status, HabitStatus::Completed);
    assert_eq!(stored.last_completed_on, Some(date(2024, 1, 3)));
    assert_eq!(stored.completion_history, history);

    let err = store
        .update_habit_status("missing", HabitStatus::Skipped, None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RoutineOsError::NotFound(_)));
}

#[tokio::test]
async fn deleting_a_system_and_its_habits() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let keep = System::new("Keep");
    let drop = System::new("Drop");
    store.upsert_system(&keep).await.unwrap();
    store.upsert_system(&drop).await.unwrap();
    let kept = sample_habit(&keep.id);
    store.upsert_habit(&kept).await.unwrap();
    store.upsert_habit(&sample_habit(&drop.id)).await.unwrap();
    store.upsert_habit(&sample_habit(&drop.id)).await.unwrap();

    store.delete_habits_for_system(&drop.id).await.unwrap();
    store.delete_system(&drop.id).await.unwrap();

    let systems = store.list_systems().await.unwrap();
    assert_eq!(systems, vec![keep]);
    let habits = store.list_habits().await.unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0].id, kept.id);

    store.delete_habit(&kept.id).await.unwrap();
    assert!(store.list_habits().await.unwrap().is_empty());
}

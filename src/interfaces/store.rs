use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domains::{CompletionEntry, Habit, HabitStatus, System};
use crate::error::Result;

/// Persistence for systems and habits. Implementations read and write the
/// canonical model; any row-format translation stays inside them.
#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn list_systems(&self) -> Result<Vec<System>>;
    async fn upsert_system(&self, system: &System) -> Result<()>;
    async fn delete_system(&self, id: &str) -> Result<()>;

    async fn list_habits(&self) -> Result<Vec<Habit>>;
    async fn upsert_habit(&self, habit: &Habit) -> Result<()>;
    async fn delete_habit(&self, id: &str) -> Result<()>;
    async fn delete_habits_for_system(&self, system_id: &str) -> Result<()>;

    /// Persists a status change. `last_completed_on` and the full history are
    /// replaced with the given values.
    async fn update_habit_status(
        &self,
        habit_id: &str,
        status: HabitStatus,
        last_completed_on: Option<NaiveDate>,
        history: &[CompletionEntry],
    ) -> Result<()>;
}

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::{json, Value};

use super::schema::{habits, systems};
use crate::adapter;
use crate::db::{self, now_ts, SqlitePool, SqlitePooledConn};
use crate::domains::{CompletionEntry, Habit, HabitStatus, Purpose, System, TimeBlock};
use crate::error::{Result, RoutineOsError};
use crate::interfaces::store::HabitStore;

#[derive(Queryable, Selectable)]
#[diesel(table_name = systems)]
struct SystemRow {
    id: String,
    name: String,
    description: String,
    color: String,
    icon: String,
    order_index: i32,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = systems)]
struct SystemRecord<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    color: &'a str,
    icon: &'a str,
    order_index: i32,
    updated_at: i64,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = habits)]
struct HabitRow {
    id: String,
    system_id: String,
    name: String,
    frequency: String,
    start_date: Option<String>,
    duration_minutes: i32,
    notes: String,
    purpose: Option<String>,
    preferred_time_block: Option<String>,
    status: String,
    last_completed_on: Option<String>,
    completion_history: String,
    sub_habits: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = habits)]
#[diesel(treat_none_as_null = true)]
struct HabitRecord<'a> {
    id: &'a str,
    system_id: &'a str,
    name: &'a str,
    frequency: String,
    start_date: Option<String>,
    duration_minutes: i32,
    notes: &'a str,
    purpose: Option<&'static str>,
    preferred_time_block: Option<&'static str>,
    status: &'static str,
    last_completed_on: Option<String>,
    completion_history: String,
    sub_habits: String,
    updated_at: i64,
}

fn storage_err(err: impl std::fmt::Display) -> RoutineOsError {
    RoutineOsError::Storage(err.to_string())
}

fn iso(date: Option<NaiveDate>) -> Option<String> {
    date.map(|date| date.format("%Y-%m-%d").to_string())
}

/// JSON text columns are parsed when possible; anything else is handed to
/// the adapter as a plain string.
fn json_column(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn system_from_row(row: SystemRow) -> Result<System> {
    adapter::system_from_value(&json!({
        "id": row.id,
        "name": row.name,
        "description": row.description,
        "color": row.color,
        "icon": row.icon,
        "order_index": row.order_index,
    }))
}

fn habit_from_row(row: HabitRow) -> Result<Habit> {
    adapter::habit_from_value(&json!({
        "id": row.id,
        "system_id": row.system_id,
        "name": row.name,
        "frequency": json_column(&row.frequency),
        "start_date": row.start_date,
        "duration_minutes": row.duration_minutes,
        "notes": row.notes,
        "purpose": row.purpose,
        "preferred_time_block": row.preferred_time_block,
        "status": row.status,
        "last_completed_on": row.last_completed_on,
        "completion_history": json_column(&row.completion_history),
        "sub_habits": json_column(&row.sub_habits),
    }))
}

fn habit_record(habit: &Habit, now: i64) -> Result<HabitRecord<'_>> {
    Ok(HabitRecord {
        id: &habit.id,
        system_id: &habit.system_id,
        name: &habit.name,
        frequency: serde_json::to_string(&habit.frequency)?,
        start_date: iso(habit.start_date),
        duration_minutes: habit.duration_minutes.min(i32::MAX as u32) as i32,
        notes: &habit.notes,
        purpose: habit.purpose.map(Purpose::as_str),
        preferred_time_block: habit.preferred_time_block.map(TimeBlock::as_str),
        status: habit.status.as_str(),
        last_completed_on: iso(habit.last_completed_on),
        completion_history: serde_json::to_string(&habit.completion_history)?,
        sub_habits: serde_json::to_string(&habit.sub_habits)?,
        updated_at: now,
    })
}

/// Local SQLite backend.
pub struct SqliteHabitStore {
    pool: SqlitePool,
}

impl SqliteHabitStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let pool = db::open_pool(sqlite_path.as_ref()).await?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        let mut conn = self.pool.get().await.map_err(storage_err)?;
        db::apply_pragmas_async(&mut conn).await?;
        Ok(conn)
    }
}

#[async_trait]
impl HabitStore for SqliteHabitStore {
    async fn list_systems(&self) -> Result<Vec<System>> {
        let mut conn = self.conn().await?;
        let rows: Vec<SystemRow> = systems::table
            .select(SystemRow::as_select())
            .order((systems::order_index.asc(), systems::name.asc()))
            .load(&mut conn)
            .await
            .map_err(storage_err)?;
        rows.into_iter().map(system_from_row).collect()
    }

    async fn upsert_system(&self, system: &System) -> Result<()> {
        let now = now_ts();
        let record = SystemRecord {
            id: &system.id,
            name: &system.name,
            description: &system.description,
            color: &system.color,
            icon: &system.icon,
            order_index: system.order_index,
            updated_at: now,
        };
        let mut conn = self.conn().await?;

        let updated = diesel::update(systems::table.filter(systems::id.eq(&system.id)))
            .set(&record)
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;
        if updated == 0 {
            diesel::insert_into(systems::table)
                .values((&record, systems::created_at.eq(now)))
                .execute(&mut conn)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn delete_system(&self, id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(systems::table.filter(systems::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_habits(&self) -> Result<Vec<Habit>> {
        let mut conn = self.conn().await?;
        let rows: Vec<HabitRow> = habits::table
            .select(HabitRow::as_select())
            .order((habits::created_at.asc(), habits::name.asc()))
            .load(&mut conn)
            .await
            .map_err(storage_err)?;

        let mut loaded = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match habit_from_row(row) {
                Ok(habit) => loaded.push(habit),
                Err(err) => tracing::warn!(habit_id = %id, error = %err, "Skipping unreadable habit row"),
            }
        }
        Ok(loaded)
    }

    async fn upsert_habit(&self, habit: &Habit) -> Result<()> {
        let now = now_ts();
        let record = habit_record(habit, now)?;
        let mut conn = self.conn().await?;

        let updated = diesel::update(habits::table.filter(habits::id.eq(&habit.id)))
            .set(&record)
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;
        if updated == 0 {
            diesel::insert_into(habits::table)
                .values((&record, habits::created_at.eq(now)))
                .execute(&mut conn)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn delete_habit(&self, id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(habits::table.filter(habits::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_habits_for_system(&self, system_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let removed = diesel::delete(habits::table.filter(habits::system_id.eq(system_id)))
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;
        tracing::debug!(system_id, removed, "Deleted habits for system");
        Ok(())
    }

    async fn update_habit_status(
        &self,
        habit_id: &str,
        status: HabitStatus,
        last_completed_on: Option<NaiveDate>,
        history: &[CompletionEntry],
    ) -> Result<()> {
        let now = now_ts();
        let history = serde_json::to_string(history)?;
        let mut conn = self.conn().await?;
        let target = habits::table.filter(habits::id.eq(habit_id));

        let updated = diesel::update(target)
            .set((
                habits::status.eq(status.as_str()),
                habits::last_completed_on.eq(iso(last_completed_on)),
                habits::completion_history.eq(&history),
                habits::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(storage_err)?;

        if updated == 0 {
            return Err(RoutineOsError::NotFound(habit_id.to_string()));
        }
        Ok(())
    }
}

//! The application service behind the CLI and the daemon.
//!
//! Every mutation computes the next state with [`reduce`], writes the
//! affected records, and only then commits the new state. A failed write
//! leaves the in-memory state as it was.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analytics::{self, AnalyticsSummary};
use crate::domains::{
    Frequency, Habit, HabitStatus, Purpose, SubHabit, System, TimeBlock,
};
use crate::error::{Result, RoutineOsError};
use crate::interfaces::store::HabitStore;
use crate::prefs::{Preferences, PreferencesFile};
use crate::recurrence::is_scheduled_on;
use crate::state::{reduce, Action, RoutineState, Theme};
use crate::status::{current_streak, effective_status, status_map};

/// Habits sent to the likelihood endpoint from the app itself.
pub const MAX_PREDICTION_HABITS: usize = 25;

pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHabitInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitInput {
    #[serde(default)]
    pub id: Option<String>,
    pub system_id: String,
    pub name: String,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub purpose: Option<Purpose>,
    #[serde(default)]
    pub preferred_time_block: Option<TimeBlock>,
    #[serde(default)]
    pub sub_habits: Option<Vec<SubHabitInput>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHabitEntry {
    pub id: String,
    pub name: String,
    pub status: HabitStatus,
}

/// One row of the Today view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayEntry {
    pub habit_id: String,
    pub name: String,
    pub system_id: String,
    pub system_name: String,
    pub system_color: String,
    pub frequency: String,
    pub preferred_time_block: Option<TimeBlock>,
    pub duration_minutes: u32,
    pub status: HabitStatus,
    pub streak: u32,
    pub sub_habits: Vec<SubHabitEntry>,
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RoutineOsError::Validation(format!("{what} name is required")));
    }
    Ok(trimmed.to_string())
}

fn build_sub_habits(habit_id: &str, inputs: Vec<SubHabitInput>) -> Vec<SubHabit> {
    inputs
        .into_iter()
        .filter(|input| !input.name.trim().is_empty())
        .enumerate()
        .map(|(index, input)| {
            let mut sub = SubHabit::new(habit_id, input.name.trim(), index as i32);
            if let Some(id) = input.id.filter(|id| !id.trim().is_empty()) {
                sub.id = id;
            }
            sub.notes = input.notes.unwrap_or_default();
            sub
        })
        .collect()
}

pub struct RoutineService {
    store: Arc<dyn HabitStore>,
    prefs: PreferencesFile,
    state: RoutineState,
    trend_days: usize,
}

impl RoutineService {
    pub fn new(store: Arc<dyn HabitStore>, prefs: PreferencesFile, trend_days: usize) -> Self {
        Self {
            store,
            prefs,
            state: RoutineState::default(),
            trend_days: trend_days.max(1),
        }
    }

    pub fn state(&self) -> &RoutineState {
        &self.state
    }

    fn preferences(state: &RoutineState) -> Preferences {
        Preferences {
            theme: state.theme,
            sub_habit_statuses: state.sub_habit_statuses.clone(),
            today_order: state.today_order.clone(),
            systems_order: state
                .ordered_systems()
                .into_iter()
                .map(|system| system.id.clone())
                .collect(),
        }
    }

    fn save_preferences(&self, state: &RoutineState) -> Result<()> {
        self.prefs.save(&Self::preferences(state))
    }

    /// Reads systems and habits from the store and restores preferences.
    pub async fn load(&mut self) -> Result<()> {
        let systems = self.store.list_systems().await?;
        let habits = self.store.list_habits().await?;
        let prefs = self.prefs.load();
        tracing::debug!(systems = systems.len(), habits = habits.len(), "Loaded routine");

        let mut next = reduce(&RoutineState::default(), Action::Hydrate { systems, habits });
        next = reduce(
            &next,
            Action::RestorePreferences {
                theme: prefs.theme,
                sub_habit_statuses: prefs.sub_habit_statuses,
                today_order: prefs.today_order,
            },
        );
        if !prefs.systems_order.is_empty() {
            next = reduce(&next, Action::ReorderSystems(prefs.systems_order));
        }
        self.state = next;
        Ok(())
    }

    pub async fn create_system(&mut self, input: SystemInput) -> Result<System> {
        let mut system = System::new(require_name(&input.name, "system")?);
        if let Some(id) = input.id.filter(|id| !id.trim().is_empty()) {
            system.id = id;
        }
        if let Some(description) = input.description {
            system.description = description;
        }
        if let Some(color) = input.color.filter(|color| !color.trim().is_empty()) {
            system.color = color;
        }
        if let Some(icon) = input.icon.filter(|icon| !icon.trim().is_empty()) {
            system.icon = icon;
        }
        system.order_index = self
            .state
            .systems
            .iter()
            .map(|existing| existing.order_index + 1)
            .max()
            .unwrap_or(0);

        let next = reduce(&self.state, Action::UpsertSystem(system.clone()));
        self.store.upsert_system(&system).await?;
        self.state = next;
        tracing::info!(system_id = %system.id, "Created system");
        Ok(system)
    }

    pub async fn update_system(&mut self, id: &str, input: SystemInput) -> Result<System> {
        let name = require_name(&input.name, "system")?;
        let mut system = self
            .state
            .system(id)
            .cloned()
            .ok_or_else(|| RoutineOsError::NotFound(id.to_string()))?;
        system.name = name;
        if let Some(description) = input.description {
            system.description = description;
        }
        if let Some(color) = input.color.filter(|color| !color.trim().is_empty()) {
            system.color = color;
        }
        if let Some(icon) = input.icon.filter(|icon| !icon.trim().is_empty()) {
            system.icon = icon;
        }

        let next = reduce(&self.state, Action::UpsertSystem(system.clone()));
        self.store.upsert_system(&system).await?;
        self.state = next;
        Ok(system)
    }

    /// Update when `input.id` names a known system, create otherwise.
    pub async fn save_system(&mut self, input: SystemInput) -> Result<System> {
        match input.id.clone().filter(|id| self.state.system(id).is_some()) {
            Some(id) => self.update_system(&id, input).await,
            None => self.create_system(input).await,
        }
    }

    /// Removes the system and every habit in it.
    pub async fn delete_system(&mut self, id: &str) -> Result<()> {
        if self.state.system(id).is_none() {
            return Err(RoutineOsError::NotFound(id.to_string()));
        }
        let next = reduce(&self.state, Action::DeleteSystem(id.to_string()));
        self.store.delete_habits_for_system(id).await?;
        self.store.delete_system(id).await?;
        self.save_preferences(&next)?;
        self.state = next;
        tracing::info!(system_id = id, "Deleted system");
        Ok(())
    }

    pub async fn create_habit(&mut self, input: HabitInput, today: NaiveDate) -> Result<Habit> {
        let name = require_name(&input.name, "habit")?;
        if self.state.system(&input.system_id).is_none() {
            return Err(RoutineOsError::NotFound(input.system_id));
        }

        let mut habit = Habit::new(
            input.system_id.clone(),
            name,
            input.frequency.unwrap_or_default(),
        );
        if let Some(id) = input.id.filter(|id| !id.trim().is_empty()) {
            habit.id = id;
        }
        habit.start_date = input.start_date.or(Some(today));
        habit.duration_minutes = input.duration_minutes.unwrap_or(0);
        habit.notes = input.notes.unwrap_or_default();
        habit.purpose = input.purpose;
        habit.preferred_time_block = input.preferred_time_block;
        habit.sub_habits = build_sub_habits(&habit.id, input.sub_habits.unwrap_or_default());

        let next = reduce(&self.state, Action::UpsertHabit(habit.clone()));
        self.store.upsert_habit(&habit).await?;
        self.state = next;
        tracing::info!(habit_id = %habit.id, "Created habit");
        Ok(habit)
    }

    /// Replaces the editable fields; status and history are kept.
    pub async fn update_habit(&mut self, id: &str, input: HabitInput) -> Result<Habit> {
        let name = require_name(&input.name, "habit")?;
        let mut habit = self
            .state
            .habit(id)
            .cloned()
            .ok_or_else(|| RoutineOsError::NotFound(id.to_string()))?;
        if self.state.system(&input.system_id).is_none() {
            return Err(RoutineOsError::NotFound(input.system_id));
        }

        habit.name = name;
        habit.system_id = input.system_id;
        if let Some(frequency) = input.frequency {
            habit.frequency = frequency;
        }
        if input.start_date.is_some() {
            habit.start_date = input.start_date;
        }
        if let Some(minutes) = input.duration_minutes {
            habit.duration_minutes = minutes;
        }
        if let Some(notes) = input.notes {
            habit.notes = notes;
        }
        habit.purpose = input.purpose;
        habit.preferred_time_block = input.preferred_time_block;
        if let Some(subs) = input.sub_habits {
            habit.sub_habits = build_sub_habits(&habit.id, subs);
        }

        let next = reduce(&self.state, Action::UpsertHabit(habit.clone()));
        self.store.upsert_habit(&habit).await?;
        self.save_preferences(&next)?;
        self.state = next;
        Ok(habit)
    }

    pub async fn save_habit(&mut self, input: HabitInput, today: NaiveDate) -> Result<Habit> {
        match input.id.clone().filter(|id| self.state.habit(id).is_some()) {
            Some(id) => self.update_habit(&id, input).await,
            None => self.create_habit(input, today).await,
        }
    }

    pub async fn delete_habit(&mut self, id: &str) -> Result<()> {
        if self.state.habit(id).is_none() {
            return Err(RoutineOsError::NotFound(id.to_string()));
        }
        let next = reduce(&self.state, Action::DeleteHabit(id.to_string()));
        self.store.delete_habit(id).await?;
        self.save_preferences(&next)?;
        self.state = next;
        Ok(())
    }

    pub async fn set_habit_status(
        &mut self,
        habit_id: &str,
        status: HabitStatus,
        on: NaiveDate,
    ) -> Result<Habit> {
        if self.state.habit(habit_id).is_none() {
            return Err(RoutineOsError::NotFound(habit_id.to_string()));
        }
        let next = reduce(
            &self.state,
            Action::SetHabitStatus {
                habit_id: habit_id.to_string(),
                status,
                on,
            },
        );
        let habit = next
            .habit(habit_id)
            .cloned()
            .ok_or_else(|| RoutineOsError::NotFound(habit_id.to_string()))?;
        self.store
            .update_habit_status(habit_id, status, habit.last_completed_on, &habit.completion_history)
            .await?;
        self.state = next;
        tracing::debug!(habit_id, status = %status, %on, "Habit status updated");
        Ok(habit)
    }

    /// Updates a checklist item and returns its parent's effective status.
    pub fn set_sub_habit_status(
        &mut self,
        sub_habit_id: &str,
        status: HabitStatus,
        today: NaiveDate,
    ) -> Result<HabitStatus> {
        let parent = self
            .state
            .habits
            .iter()
            .find(|habit| habit.sub_habits.iter().any(|sub| sub.id == sub_habit_id))
            .map(|habit| habit.id.clone())
            .ok_or_else(|| RoutineOsError::NotFound(sub_habit_id.to_string()))?;
        let next = reduce(
            &self.state,
            Action::SetSubHabitStatus {
                sub_habit_id: sub_habit_id.to_string(),
                status,
            },
        );
        self.save_preferences(&next)?;
        self.state = next;

        let habit = self
            .state
            .habit(&parent)
            .ok_or_else(|| RoutineOsError::NotFound(parent.clone()))?;
        Ok(effective_status(habit, today, &self.state.sub_habit_statuses))
    }

    pub async fn reorder_systems(&mut self, ids: Vec<String>) -> Result<()> {
        let next = reduce(&self.state, Action::ReorderSystems(ids));
        for system in &next.systems {
            let changed = self
                .state
                .system(&system.id)
                .map(|previous| previous.order_index != system.order_index)
                .unwrap_or(true);
            if changed {
                self.store.upsert_system(system).await?;
            }
        }
        self.save_preferences(&next)?;
        self.state = next;
        Ok(())
    }

    pub fn reorder_today(&mut self, ids: Vec<String>) -> Result<()> {
        let next = reduce(&self.state, Action::ReorderToday(ids));
        self.save_preferences(&next)?;
        self.state = next;
        Ok(())
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        let next = reduce(&self.state, Action::SetTheme(theme));
        self.save_preferences(&next)?;
        self.state = next;
        Ok(())
    }

    pub fn status_map(&self, today: NaiveDate) -> HashMap<String, HabitStatus> {
        status_map(&self.state.habits, today, &self.state.sub_habit_statuses)
    }

    /// Habits scheduled on `today`, in manual order when one is saved,
    /// otherwise by time block and then name.
    pub fn today(&self, today: NaiveDate) -> Vec<TodayEntry> {
        let state = &self.state;
        let manual: HashMap<&str, usize> = state
            .today_order
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();

        let mut scheduled: Vec<&Habit> = state
            .habits
            .iter()
            .filter(|habit| is_scheduled_on(&habit.frequency, habit.start_date, today))
            .collect();
        scheduled.sort_by(|a, b| {
            match (manual.get(a.id.as_str()), manual.get(b.id.as_str())) {
                (Some(left), Some(right)) => return left.cmp(right),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => {}
            }
            TimeBlock::sort_weight(a.preferred_time_block)
                .cmp(&TimeBlock::sort_weight(b.preferred_time_block))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        scheduled
            .into_iter()
            .map(|habit| {
                let system = state.system(&habit.system_id);
                TodayEntry {
                    habit_id: habit.id.clone(),
                    name: habit.name.clone(),
                    system_id: habit.system_id.clone(),
                    system_name: system
                        .map(|system| system.name.clone())
                        .unwrap_or_else(|| "System".to_string()),
                    system_color: system
                        .map(|system| system.color.clone())
                        .unwrap_or_default(),
                    frequency: habit.frequency.label(),
                    preferred_time_block: habit.preferred_time_block,
                    duration_minutes: habit.duration_minutes,
                    status: effective_status(habit, today, &state.sub_habit_statuses),
                    streak: current_streak(habit, today),
                    sub_habits: habit
                        .ordered_sub_habits()
                        .into_iter()
                        .map(|sub| SubHabitEntry {
                            id: sub.id.clone(),
                            name: sub.name.clone(),
                            status: state
                                .sub_habit_statuses
                                .get(&sub.id)
                                .copied()
                                .unwrap_or_default(),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    pub fn analytics(&self, today: NaiveDate) -> AnalyticsSummary {
        let systems: Vec<System> = self
            .state
            .ordered_systems()
            .into_iter()
            .cloned()
            .collect();
        analytics::summarize(
            &self.state.habits,
            &systems,
            &self.status_map(today),
            today,
            self.trend_days,
        )
    }

    /// Habit records in the shape the likelihood endpoint expects.
    pub fn likelihood_payload(&self, today: NaiveDate) -> Value {
        let statuses = self.status_map(today);
        let habits: Vec<Value> = self
            .state
            .habits
            .iter()
            .take(MAX_PREDICTION_HABITS)
            .map(|habit| {
                let (days_of_week, interval_days) = match &habit.frequency {
                    Frequency::DaysOfWeek { days } => (json!(days), Value::Null),
                    Frequency::EveryXDays { interval_days } => (json!([]), json!(interval_days)),
                    Frequency::Daily => (json!([]), Value::Null),
                };
                json!({
                    "id": habit.id,
                    "name": habit.name,
                    "systemId": habit.system_id,
                    "systemName": self
                        .state
                        .system(&habit.system_id)
                        .map(|system| system.name.as_str())
                        .unwrap_or("System"),
                    "purpose": habit.purpose.map(Purpose::as_str).unwrap_or(""),
                    "status": habit.status,
                    "todayStatus": statuses.get(&habit.id).copied().unwrap_or(habit.status),
                    "lastCompletedOn": habit.last_completed_on,
                    "completionHistory": habit.completion_history,
                    "frequency": habit.frequency.kind(),
                    "daysOfWeek": days_of_week,
                    "intervalDays": interval_days,
                    "streak": current_streak(habit, today),
                    "startDate": habit.start_date,
                    "notes": habit.notes,
                })
            })
            .collect();
        Value::Array(habits)
    }

    /// Context handed to the coach alongside the conversation.
    pub fn coach_context(&self, today: NaiveDate) -> Value {
        let summary = self.analytics(today);
        let systems: Vec<Value> = self
            .state
            .ordered_systems()
            .into_iter()
            .map(|system| json!({"id": system.id, "name": system.name, "color": system.color}))
            .collect();
        json!({
            "date": today,
            "systems": systems,
            "statusMap": self.status_map(today),
            "bySystem": summary.by_system,
            "today": self
                .today(today)
                .into_iter()
                .map(|entry| json!({
                    "name": entry.name,
                    "systemName": entry.system_name,
                    "status": entry.status,
                    "streak": entry.streak,
                }))
                .collect::<Vec<_>>(),
            "todayPercent": summary.today_percent,
        })
    }
}

//! The single in-memory state container and its reducer.
//!
//! Every transition goes through [`reduce`], which takes the current state
//! by reference and returns the next one. The reducer is total: actions that
//! name unknown ids return an unchanged copy.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domains::{Habit, HabitStatus, System};
use crate::error::RoutineOsError;
use crate::status::SubHabitStatuses;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = RoutineOsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(RoutineOsError::Validation(format!("unknown theme: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineState {
    pub systems: Vec<System>,
    pub habits: Vec<Habit>,
    pub sub_habit_statuses: SubHabitStatuses,
    pub today_order: Vec<String>,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Hydrate {
        systems: Vec<System>,
        habits: Vec<Habit>,
    },
    RestorePreferences {
        theme: Theme,
        sub_habit_statuses: SubHabitStatuses,
        today_order: Vec<String>,
    },
    UpsertSystem(System),
    DeleteSystem(String),
    UpsertHabit(Habit),
    DeleteHabit(String),
    SetHabitStatus {
        habit_id: String,
        status: HabitStatus,
        on: NaiveDate,
    },
    SetSubHabitStatus {
        sub_habit_id: String,
        status: HabitStatus,
    },
    ReorderSystems(Vec<String>),
    ReorderToday(Vec<String>),
    SetTheme(Theme),
}

impl RoutineState {
    pub fn system(&self, id: &str) -> Option<&System> {
        self.systems.iter().find(|system| system.id == id)
    }

    pub fn habit(&self, id: &str) -> Option<&Habit> {
        self.habits.iter().find(|habit| habit.id == id)
    }

    pub fn habits_for_system<'a>(&'a self, system_id: &'a str) -> impl Iterator<Item = &'a Habit> {
        self.habits
            .iter()
            .filter(move |habit| habit.system_id == system_id)
    }

    /// Systems by `orderIndex`, ties broken by name.
    pub fn ordered_systems(&self) -> Vec<&System> {
        let mut systems: Vec<&System> = self.systems.iter().collect();
        systems.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        systems
    }

    fn owns_sub_habit(&self, sub_habit_id: &str) -> bool {
        self.habits
            .iter()
            .any(|habit| habit.sub_habits.iter().any(|sub| sub.id == sub_habit_id))
    }

    /// Drops cached statuses and manual ordering that point at habits or
    /// sub-habits no longer present.
    fn prune_dangling(&mut self) {
        let habit_ids: HashSet<&str> = self.habits.iter().map(|habit| habit.id.as_str()).collect();
        let sub_ids: HashSet<&str> = self
            .habits
            .iter()
            .flat_map(|habit| habit.sub_habits.iter().map(|sub| sub.id.as_str()))
            .collect();
        self.today_order.retain(|id| habit_ids.contains(id.as_str()));
        self.sub_habit_statuses
            .retain(|id, _| sub_ids.contains(id.as_str()));
    }
}

pub fn reduce(state: &RoutineState, action: Action) -> RoutineState {
    let mut next = state.clone();
    match action {
        Action::Hydrate { systems, habits } => {
            next.systems = systems;
            next.habits = habits;
        }
        Action::RestorePreferences {
            theme,
            sub_habit_statuses,
            today_order,
        } => {
            next.theme = theme;
            next.sub_habit_statuses = sub_habit_statuses;
            next.today_order = today_order;
            next.prune_dangling();
        }
        Action::UpsertSystem(system) => {
            match next.systems.iter_mut().find(|existing| existing.id == system.id) {
                Some(existing) => *existing = system,
                None => next.systems.push(system),
            }
        }
        Action::DeleteSystem(id) => {
            if next.system(&id).is_none() {
                return next;
            }
            next.systems.retain(|system| system.id != id);
            next.habits.retain(|habit| habit.system_id != id);
            next.prune_dangling();
        }
        Action::UpsertHabit(habit) => {
            match next.habits.iter_mut().find(|existing| existing.id == habit.id) {
                Some(existing) => *existing = habit,
                None => next.habits.push(habit),
            }
            next.prune_dangling();
        }
        Action::DeleteHabit(id) => {
            if next.habit(&id).is_none() {
                return next;
            }
            next.habits.retain(|habit| habit.id != id);
            next.prune_dangling();
        }
        Action::SetHabitStatus {
            habit_id,
            status,
            on,
        } => {
            if let Some(habit) = next.habits.iter_mut().find(|habit| habit.id == habit_id) {
                habit.status = status;
                habit.record_outcome(on, status);
                if status == HabitStatus::Completed {
                    habit.last_completed_on = Some(on);
                } else if habit.last_completed_on == Some(on) {
                    // Un-completing a day falls back to the previous completion.
                    habit.last_completed_on = habit
                        .completion_history
                        .iter()
                        .filter(|entry| entry.status == HabitStatus::Completed)
                        .map(|entry| entry.date)
                        .max();
                }
            }
        }
        Action::SetSubHabitStatus {
            sub_habit_id,
            status,
        } => {
            if next.owns_sub_habit(&sub_habit_id) {
                next.sub_habit_statuses.insert(sub_habit_id, status);
            }
        }
        Action::ReorderSystems(ids) => {
            let listed = ids.len() as i32;
            let mut unlisted: Vec<&mut System> = Vec::new();
            let mut ordered = next.systems.iter_mut().collect::<Vec<_>>();
            ordered.sort_by_key(|system| system.order_index);
            for system in ordered {
                match ids.iter().position(|id| *id == system.id) {
                    Some(position) => system.order_index = position as i32,
                    None => unlisted.push(system),
                }
            }
            for (offset, system) in unlisted.into_iter().enumerate() {
                system.order_index = listed + offset as i32;
            }
        }
        Action::ReorderToday(ids) => {
            let mut seen = HashSet::new();
            next.today_order = ids
                .into_iter()
                .filter(|id| next.habits.iter().any(|habit| habit.id == *id))
                .filter(|id| seen.insert(id.clone()))
                .collect();
        }
        Action::SetTheme(theme) => next.theme = theme,
    }
    next
}

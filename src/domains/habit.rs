use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::RoutineOsError;

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HabitStatus {
    #[default]
    NotStarted,
    Ongoing,
    Completed,
    Skipped,
}

impl HabitStatus {
    pub const ALL: [HabitStatus; 4] = [
        HabitStatus::NotStarted,
        HabitStatus::Ongoing,
        HabitStatus::Completed,
        HabitStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HabitStatus::NotStarted => "notStarted",
            HabitStatus::Ongoing => "ongoing",
            HabitStatus::Completed => "completed",
            HabitStatus::Skipped => "skipped",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HabitStatus::NotStarted => "Not started",
            HabitStatus::Ongoing => "Ongoing",
            HabitStatus::Completed => "Completed",
            HabitStatus::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for HabitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HabitStatus {
    type Err = RoutineOsError;

    /// Accepts the canonical camelCase names as well as the PascalCase,
    /// snake_case and spaced spellings found in older persisted data.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "notstarted" | "todo" | "pending" | "notcompleted" => Ok(HabitStatus::NotStarted),
            "ongoing" | "inprogress" | "started" => Ok(HabitStatus::Ongoing),
            "completed" | "complete" | "done" => Ok(HabitStatus::Completed),
            "skipped" | "skip" => Ok(HabitStatus::Skipped),
            _ => Err(RoutineOsError::Validation(format!(
                "unknown habit status: {value}"
            ))),
        }
    }
}

/// Recurrence rule of a habit. Weekday indices run from 0 (Sunday) to 6
/// (Saturday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frequency {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "daysOfWeek")]
    DaysOfWeek {
        #[serde(rename = "daysOfWeek", default)]
        days: BTreeSet<u8>,
    },
    #[serde(rename = "everyXDays")]
    EveryXDays {
        #[serde(rename = "intervalDays")]
        interval_days: u32,
    },
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Daily
    }
}

impl Frequency {
    pub fn days_of_week(days: impl IntoIterator<Item = u8>) -> Self {
        Frequency::DaysOfWeek {
            days: days.into_iter().filter(|day| *day < 7).collect(),
        }
    }

    pub fn every_x_days(interval_days: u32) -> Self {
        Frequency::EveryXDays { interval_days }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::DaysOfWeek { .. } => "daysOfWeek",
            Frequency::EveryXDays { .. } => "everyXDays",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Frequency::Daily => "Daily".to_string(),
            Frequency::DaysOfWeek { days } => {
                let names = days
                    .iter()
                    .filter_map(|day| WEEKDAY_LABELS.get(*day as usize).copied())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Weekly: {names}")
            }
            Frequency::EveryXDays { interval_days } => {
                let plural = if *interval_days == 1 { "" } else { "s" };
                format!("Every {interval_days} day{plural}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    Mind,
    Body,
    Intelligence,
    Money,
    Home,
}

impl Purpose {
    pub const ALL: [Purpose; 5] = [
        Purpose::Mind,
        Purpose::Body,
        Purpose::Intelligence,
        Purpose::Money,
        Purpose::Home,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Mind => "Mind",
            Purpose::Body => "Body",
            Purpose::Intelligence => "Intelligence",
            Purpose::Money => "Money",
            Purpose::Home => "Home",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Purpose::ALL
            .into_iter()
            .find(|purpose| purpose.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBlock {
    Morning,
    Midday,
    Evening,
}

impl TimeBlock {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBlock::Morning => "Morning",
            TimeBlock::Midday => "Midday",
            TimeBlock::Evening => "Evening",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "morning" => Some(TimeBlock::Morning),
            "midday" | "noon" | "afternoon" => Some(TimeBlock::Midday),
            "evening" | "night" => Some(TimeBlock::Evening),
            _ => None,
        }
    }

    /// Habits without a block sort after every block.
    pub fn sort_weight(block: Option<TimeBlock>) -> u8 {
        match block {
            Some(TimeBlock::Morning) => 1,
            Some(TimeBlock::Midday) => 2,
            Some(TimeBlock::Evening) => 3,
            None => 99,
        }
    }
}

/// One dated outcome recorded for a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub date: NaiveDate,
    pub status: HabitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubHabit {
    pub id: String,
    pub habit_id: String,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub sort_order: i32,
}

impl SubHabit {
    pub fn new(habit_id: impl Into<String>, name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            id: super::generate_id("subhabit"),
            habit_id: habit_id.into(),
            name: name.into(),
            notes: String::new(),
            sort_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub system_id: String,
    pub name: String,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub purpose: Option<Purpose>,
    #[serde(default)]
    pub preferred_time_block: Option<TimeBlock>,
    #[serde(default)]
    pub status: HabitStatus,
    #[serde(default)]
    pub last_completed_on: Option<NaiveDate>,
    #[serde(default)]
    pub completion_history: Vec<CompletionEntry>,
    #[serde(default)]
    pub sub_habits: Vec<SubHabit>,
}

impl Habit {
    pub fn new(system_id: impl Into<String>, name: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            id: super::generate_id("habit"),
            system_id: system_id.into(),
            name: name.into(),
            frequency,
            start_date: None,
            duration_minutes: 0,
            notes: String::new(),
            purpose: None,
            preferred_time_block: None,
            status: HabitStatus::NotStarted,
            last_completed_on: None,
            completion_history: Vec::new(),
            sub_habits: Vec::new(),
        }
    }

    /// Sub-habits ordered by their sort order, ties kept in list order.
    pub fn ordered_sub_habits(&self) -> Vec<&SubHabit> {
        let mut items: Vec<&SubHabit> = self.sub_habits.iter().collect();
        items.sort_by_key(|sub| sub.sort_order);
        items
    }

    /// Records an outcome for `date`, replacing any earlier entry for the
    /// same day and keeping the history sorted by date.
    pub fn record_outcome(&mut self, date: NaiveDate, status: HabitStatus) {
        self.completion_history.retain(|entry| entry.date != date);
        self.completion_history.push(CompletionEntry { date, status });
        self.completion_history.sort_by_key(|entry| entry.date);
    }
}

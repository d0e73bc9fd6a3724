//! Storage boundary adapter.
//!
//! Persisted rows come in more than one dialect: snake_case columns from the
//! hosted store, camelCase blobs written by older clients, frequencies stored
//! either as a bare string with sibling fields or as a tagged object, and
//! completion history in half a dozen shapes. Everything is normalised here
//! into the canonical types in [`crate::domains`]; nothing past this module
//! looks at raw JSON.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::domains::{
    CompletionEntry, Frequency, Habit, HabitStatus, Purpose, SubHabit, System, TimeBlock,
};
use crate::domains::system::{DEFAULT_COLOR, DEFAULT_ICON};
use crate::error::{Result, RoutineOsError};

const HISTORY_KEYS: [&str; 5] = [
    "completionHistory",
    "completion_history",
    "history",
    "historyEntries",
    "history_entries",
];
const ENTRY_DATE_KEYS: [&str; 6] = [
    "date",
    "day",
    "completedOn",
    "completed_on",
    "dateString",
    "timestamp",
];
const COMPLETED_WORDS: [&str; 6] = ["completed", "complete", "done", "success", "true", "1"];

fn date_prefix_re() -> Option<&'static Regex> {
    static DATE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    DATE_RE
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").ok())
        .as_ref()
}

fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    field(map, keys).and_then(text)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Parses the leading `YYYY-MM-DD` of a string; timestamps keep their date.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    if !date_prefix_re()?.is_match(raw) {
        return None;
    }
    NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d").ok()
}

/// Maps any persisted status encoding onto a [`HabitStatus`]. Unknown
/// values read as not started.
pub fn status_from_value(value: &Value) -> HabitStatus {
    match value {
        Value::Bool(true) => HabitStatus::Completed,
        Value::Number(number) if number.as_f64().unwrap_or(0.0) > 0.0 => HabitStatus::Completed,
        Value::String(raw) => {
            let lower = raw.trim().to_ascii_lowercase();
            if COMPLETED_WORDS.contains(&lower.as_str()) {
                HabitStatus::Completed
            } else {
                raw.parse().unwrap_or_default()
            }
        }
        _ => HabitStatus::NotStarted,
    }
}

fn require(map: &Map<String, Value>, keys: &[&str], what: &str) -> Result<String> {
    string_field(map, keys)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RoutineOsError::Serialization(format!("{what} is missing `{}`", keys[0])))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| RoutineOsError::Serialization(format!("{what} must be a JSON object")))
}

pub fn system_from_value(value: &Value) -> Result<System> {
    let map = as_object(value, "system")?;
    Ok(System {
        id: require(map, &["id"], "system")?,
        name: require(map, &["name"], "system")?,
        description: string_field(map, &["description"]).unwrap_or_default(),
        color: string_field(map, &["color"])
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        icon: string_field(map, &["icon"])
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ICON.to_string()),
        order_index: position_from_value(
            field(map, &["order_index", "orderIndex", "position", "sort_order", "sortOrder"]),
            0,
        ),
    })
}

pub fn sub_habit_from_value(value: &Value, parent_id: &str, index: usize) -> Result<SubHabit> {
    let map = as_object(value, "sub-habit")?;
    Ok(SubHabit {
        id: require(map, &["id"], "sub-habit")?,
        habit_id: string_field(map, &["habit_id", "habitId", "parent_id", "parentId"])
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| parent_id.to_string()),
        name: string_field(map, &["name", "title"]).unwrap_or_default(),
        notes: string_field(map, &["notes"]).unwrap_or_default(),
        sort_order: position_from_value(
            field(map, &["sort_order", "sortOrder", "position"]),
            index as i64,
        ),
    })
}

fn days_from_value(value: Option<&Value>) -> Vec<u8> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(integer)
        .filter(|day| (0..7).contains(day))
        .map(|day| day as u8)
        .collect()
}

fn position_from_value(value: Option<&Value>, fallback: i64) -> i32 {
    value
        .and_then(integer)
        .unwrap_or(fallback)
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn interval_from_value(value: Option<&Value>) -> Option<u32> {
    value.and_then(integer).map(|days| days.clamp(0, u32::MAX as i64) as u32)
}

/// Reads the recurrence rule from either `frequency: {type, ...}` or
/// `frequency: "<type>"` / `frequency_type` with sibling fields.
pub fn frequency_from_map(map: &Map<String, Value>) -> Frequency {
    let (kind, nested) = match field(map, &["frequency"]) {
        Some(Value::Object(inner)) => (
            string_field(inner, &["type", "kind"]).unwrap_or_default(),
            Some(inner),
        ),
        Some(Value::String(raw)) => (raw.trim().to_string(), None),
        _ => (
            string_field(map, &["frequency_type", "frequencyType"]).unwrap_or_default(),
            None,
        ),
    };

    let lookup = |keys: &[&str]| nested.and_then(|inner| field(inner, keys)).or_else(|| field(map, keys));
    let days = days_from_value(lookup(&["daysOfWeek", "days_of_week", "days"]));
    let interval = interval_from_value(lookup(&["intervalDays", "interval_days", "interval"]));

    match kind.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
        "" | "daily" => Frequency::Daily,
        "daysofweek" | "weekly" | "weekdays" => Frequency::days_of_week(days),
        "everyxdays" | "interval" | "everyndays" => Frequency::every_x_days(interval.unwrap_or(0)),
        "everyotherday" => Frequency::every_x_days(interval.unwrap_or(2)),
        other => {
            // Never scheduled, so the stored status is kept as-is.
            tracing::warn!(frequency = other, "Unknown frequency type; treating as never scheduled");
            Frequency::every_x_days(0)
        }
    }
}

fn entry_from_value(entry: &Value, fallback: Option<NaiveDate>) -> Option<CompletionEntry> {
    match entry {
        Value::Null => None,
        Value::String(raw) => {
            if let Some(date) = parse_date(entry) {
                return Some(CompletionEntry {
                    date,
                    status: HabitStatus::Completed,
                });
            }
            let date = fallback?;
            Some(CompletionEntry {
                date,
                status: status_from_value(&Value::String(raw.clone())),
            })
        }
        Value::Bool(_) | Value::Number(_) => Some(CompletionEntry {
            date: fallback?,
            status: status_from_value(entry),
        }),
        Value::Array(items) => {
            let first = items.first()?;
            if let Some(date) = parse_date(first) {
                let status = match items.get(1) {
                    Some(Value::String(raw)) => status_from_value(&Value::String(raw.clone())),
                    _ => HabitStatus::Completed,
                };
                return Some(CompletionEntry { date, status });
            }
            entry_from_value(items.get(1)?, fallback.or_else(|| parse_date(first)))
        }
        Value::Object(map) => {
            let date = field(map, &ENTRY_DATE_KEYS)
                .and_then(parse_date)
                .or(fallback)?;
            let status = if let Some(value) = field(map, &["status", "value"]) {
                status_from_value(value)
            } else if let Some(Value::Bool(done)) = map.get("completed") {
                status_from_value(&Value::Bool(*done))
            } else if let Some(outcome @ Value::String(_)) = map.get("outcome") {
                status_from_value(outcome)
            } else {
                HabitStatus::Completed
            };
            Some(CompletionEntry { date, status })
        }
    }
}

/// Normalises one persisted history value into dated entries.
pub fn history_from_value(value: &Value) -> Vec<CompletionEntry> {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) if !parsed.is_string() => history_from_value(&parsed),
            _ => parse_date(value)
                .map(|date| {
                    vec![CompletionEntry {
                        date,
                        status: HabitStatus::Completed,
                    }]
                })
                .unwrap_or_default(),
        },
        Value::Array(items) => items
            .iter()
            .filter_map(|item| entry_from_value(item, None))
            .collect(),
        Value::Object(map) => {
            if field(map, &["date", "completedOn", "completed_on"]).is_some() {
                return entry_from_value(value, None).into_iter().collect();
            }
            map.iter()
                .filter_map(|(key, entry)| {
                    let fallback = parse_date(&Value::String(key.clone()));
                    entry_from_value(entry, fallback)
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn sub_habits_from_value(value: Option<&Value>, parent_id: &str) -> Result<Vec<SubHabit>> {
    let parsed;
    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::String(raw)) if !raw.trim().is_empty() => {
            parsed = serde_json::from_str::<Value>(raw)?;
            match &parsed {
                Value::Array(items) => items,
                _ => return Ok(Vec::new()),
            }
        }
        _ => return Ok(Vec::new()),
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| sub_habit_from_value(item, parent_id, index))
        .collect()
}

pub fn habit_from_value(value: &Value) -> Result<Habit> {
    let map = as_object(value, "habit")?;
    let id = require(map, &["id"], "habit")?;

    let mut habit = Habit {
        system_id: string_field(map, &["system_id", "systemId"]).unwrap_or_default(),
        name: require(map, &["name"], "habit")?,
        frequency: frequency_from_map(map),
        start_date: field(map, &["start_date", "startDate", "created_at", "createdAt"])
            .and_then(parse_date),
        duration_minutes: field(map, &["duration_minutes", "durationMinutes", "duration"])
            .and_then(integer)
            .unwrap_or(0)
            .clamp(0, u32::MAX as i64) as u32,
        notes: string_field(map, &["notes"]).unwrap_or_default(),
        purpose: string_field(map, &["purpose"]).and_then(|raw| Purpose::parse(&raw)),
        preferred_time_block: string_field(
            map,
            &["preferred_time_block", "preferredTimeBlock", "time_block", "timeBlock"],
        )
        .and_then(|raw| TimeBlock::parse(&raw)),
        status: field(map, &["status"])
            .map(status_from_value)
            .unwrap_or_default(),
        last_completed_on: field(map, &["last_completed_on", "lastCompletedOn"])
            .and_then(parse_date),
        completion_history: Vec::new(),
        sub_habits: sub_habits_from_value(field(map, &["sub_habits", "subHabits"]), &id)?,
        id,
    };

    for key in HISTORY_KEYS {
        if let Some(raw) = map.get(key) {
            for entry in history_from_value(raw) {
                habit.record_outcome(entry.date, entry.status);
            }
        }
    }

    Ok(habit)
}

/// Row shape written to the hosted store. Dates are ISO strings and nested
/// collections are JSON columns.
pub fn system_to_row_value(system: &System, user_id: Option<&str>) -> Value {
    let mut row = json!({
        "id": system.id,
        "name": system.name,
        "description": system.description,
        "color": system.color,
        "icon": system.icon,
        "order_index": system.order_index,
    });
    if let (Some(user_id), Some(map)) = (user_id, row.as_object_mut()) {
        map.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    row
}

pub fn habit_to_row_value(habit: &Habit, user_id: Option<&str>) -> Value {
    let mut row = json!({
        "id": habit.id,
        "system_id": habit.system_id,
        "name": habit.name,
        "frequency": habit.frequency,
        "start_date": habit.start_date,
        "duration_minutes": habit.duration_minutes,
        "notes": habit.notes,
        "purpose": habit.purpose.map(Purpose::as_str),
        "preferred_time_block": habit.preferred_time_block.map(TimeBlock::as_str),
        "status": habit.status.as_str(),
        "last_completed_on": habit.last_completed_on,
        "completion_history": habit.completion_history,
        "sub_habits": habit.sub_habits,
    });
    if let (Some(user_id), Some(map)) = (user_id, row.as_object_mut()) {
        map.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn snake_case_row_with_string_frequency() {
        let habit = habit_from_value(&json!({
            "id": "habit-1",
            "system_id": "system-1",
            "name": "Gym",
            "frequency_type": "daysOfWeek",
            "days_of_week": [1, "3", 5, 9],
            "status": "Completed",
            "last_completed_on": "2024-05-03T07:30:00Z",
            "preferred_time_block": "Morning",
            "purpose": "body",
            "duration_minutes": "45"
        }))
        .unwrap();

        assert_eq!(habit.system_id, "system-1");
        assert_eq!(habit.frequency, Frequency::days_of_week([1, 3, 5]));
        assert_eq!(habit.status, HabitStatus::Completed);
        assert_eq!(habit.last_completed_on, Some(date(2024, 5, 3)));
        assert_eq!(habit.preferred_time_block, Some(TimeBlock::Morning));
        assert_eq!(habit.purpose, Some(Purpose::Body));
        assert_eq!(habit.duration_minutes, 45);
    }

    #[test]
    fn camel_case_blob_with_object_frequency() {
        let habit = habit_from_value(&json!({
            "id": "habit-2",
            "systemId": "system-1",
            "name": "Laundry",
            "frequency": {"type": "everyXDays", "intervalDays": 3},
            "startDate": "2024-01-01",
            "subHabits": [
                {"id": "sub-a", "name": "Wash", "sortOrder": 1},
                {"id": "sub-b", "name": "Fold"}
            ]
        }))
        .unwrap();

        assert_eq!(habit.frequency, Frequency::every_x_days(3));
        assert_eq!(habit.start_date, Some(date(2024, 1, 1)));
        assert_eq!(habit.sub_habits.len(), 2);
        assert_eq!(habit.sub_habits[0].habit_id, "habit-2");
        assert_eq!(habit.sub_habits[1].sort_order, 1);
    }

    #[test]
    fn legacy_interval_and_every_other_day() {
        let interval = habit_from_value(&json!({
            "id": "h", "name": "n", "frequencyType": "interval", "intervalDays": -4
        }))
        .unwrap();
        assert_eq!(interval.frequency, Frequency::every_x_days(0));

        let every_other = habit_from_value(&json!({
            "id": "h", "name": "n", "frequency": "everyOtherDay"
        }))
        .unwrap();
        assert_eq!(every_other.frequency, Frequency::every_x_days(2));
    }

    #[test]
    fn unknown_frequency_is_never_scheduled() {
        let mut habit = habit_from_value(&json!({
            "id": "h", "name": "n", "frequency": {"type": "fortnightly"}, "status": "skipped",
            "startDate": "2024-01-01", "lastCompletedOn": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(habit.frequency, Frequency::every_x_days(0));
        let later = date(2024, 2, 1);
        assert!(!crate::recurrence::is_scheduled_on(&habit.frequency, habit.start_date, later));
        assert_eq!(crate::status::base_status(&habit, later), HabitStatus::Skipped);

        habit.status = HabitStatus::Ongoing;
        assert_eq!(crate::status::base_status(&habit, later), HabitStatus::Ongoing);
    }

    #[test]
    fn out_of_range_positions_are_clamped() {
        let system = system_from_value(&json!({
            "id": "s", "name": "Body", "order_index": 9_000_000_000_i64
        }))
        .unwrap();
        assert_eq!(system.order_index, i32::MAX);

        let sub = sub_habit_from_value(&json!({"id": "x", "sortOrder": -9_000_000_000_i64}), "h", 3).unwrap();
        assert_eq!(sub.sort_order, i32::MIN);
        let sub = sub_habit_from_value(&json!({"id": "y"}), "h", 3).unwrap();
        assert_eq!(sub.sort_order, 3);
    }

    #[test]
    fn missing_identity_is_rejected() {
        assert!(habit_from_value(&json!({"name": "no id"})).is_err());
        assert!(system_from_value(&json!({"id": "system-1"})).is_err());
        assert!(habit_from_value(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn history_in_mixed_shapes() {
        let habit = habit_from_value(&json!({
            "id": "h",
            "name": "n",
            "completionHistory": [
                "2024-01-01",
                ["2024-01-02", "skipped"],
                {"completedOn": "2024-01-03"},
                {"date": "2024-01-04", "completed": false}
            ],
            "history": "{\"2024-01-05\": true, \"2024-01-06\": \"done\", \"garbage\": 1}"
        }))
        .unwrap();

        let statuses: Vec<(NaiveDate, HabitStatus)> = habit
            .completion_history
            .iter()
            .map(|entry| (entry.date, entry.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (date(2024, 1, 1), HabitStatus::Completed),
                (date(2024, 1, 2), HabitStatus::Skipped),
                (date(2024, 1, 3), HabitStatus::Completed),
                (date(2024, 1, 4), HabitStatus::NotStarted),
                (date(2024, 1, 5), HabitStatus::Completed),
                (date(2024, 1, 6), HabitStatus::Completed),
            ]
        );
    }

    #[test]
    fn malformed_history_string_is_ignored() {
        assert!(history_from_value(&json!("not json")).is_empty());
        assert_eq!(history_from_value(&json!("2024-02-01")).len(), 1);
    }

    #[test]
    fn system_defaults_fill_presentation_fields() {
        let system = system_from_value(&json!({"id": "s", "name": "Body", "position": 4})).unwrap();
        assert_eq!(system.color, DEFAULT_COLOR);
        assert_eq!(system.icon, DEFAULT_ICON);
        assert_eq!(system.order_index, 4);
    }

    #[test]
    fn rows_read_back_through_the_adapter() {
        let mut habit = Habit::new("system-1", "Journal", Frequency::days_of_week([0, 6]));
        habit.record_outcome(date(2024, 3, 2), HabitStatus::Completed);
        habit.sub_habits.push(SubHabit::new(habit.id.clone(), "Prompt", 0));

        let row = habit_to_row_value(&habit, Some("user-1"));
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["frequency"]["type"], "daysOfWeek");
        assert_eq!(habit_from_value(&row).unwrap(), habit);
    }
}

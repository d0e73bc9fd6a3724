//! Local preferences: theme, sub-habit checklist state and manual ordering.
//!
//! Everything lives in one JSON object on disk keyed by fixed names. Values
//! may be stored either as JSON or as JSON encoded inside a string (the
//! browser-storage layout). Anything unreadable falls back to its default.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::domains::HabitStatus;
use crate::error::{Result, RoutineOsError};
use crate::state::Theme;
use crate::status::SubHabitStatuses;

pub const THEME_KEY: &str = "routineos_theme";
pub const SUB_HABIT_STATUSES_KEY: &str = "routineos_subhabit_statuses";
pub const TODAY_ORDER_KEY: &str = "routineos_today_order";
pub const SYSTEMS_ORDER_KEY: &str = "routineos_systems_order";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub theme: Theme,
    pub sub_habit_statuses: SubHabitStatuses,
    pub today_order: Vec<String>,
    pub systems_order: Vec<String>,
}

pub struct PreferencesFile {
    path: PathBuf,
}

fn decode<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    let raw = map.get(key)?;
    let parsed = serde_json::from_value::<T>(raw.clone()).or_else(|err| match raw {
        Value::String(encoded) => serde_json::from_str::<T>(encoded),
        _ => Err(err),
    });
    match parsed {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "Ignoring malformed preference");
            None
        }
    }
}

fn decode_theme(map: &Map<String, Value>) -> Theme {
    let Some(raw) = map.get(THEME_KEY) else {
        return Theme::default();
    };
    let text = match raw {
        Value::String(text) => text.trim().trim_matches('"').to_string(),
        _ => String::new(),
    };
    text.parse().unwrap_or_else(|_| {
        tracing::warn!(value = %raw, "Ignoring malformed theme preference");
        Theme::default()
    })
}

fn decode_statuses(map: &Map<String, Value>) -> SubHabitStatuses {
    let Some(raw) = decode::<Map<String, Value>>(map, SUB_HABIT_STATUSES_KEY) else {
        return SubHabitStatuses::new();
    };
    raw.into_iter()
        .filter_map(|(id, value)| {
            let status = value.as_str()?.parse::<HabitStatus>().ok()?;
            Some((id, status))
        })
        .collect()
}

impl PreferencesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_location() -> Self {
        Self::new(crate::runtime_paths::default_prefs_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Map<String, Value> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "Preferences file is malformed; using defaults");
                Map::new()
            }
        }
    }

    pub fn load(&self) -> Preferences {
        let map = self.read_map();
        Preferences {
            theme: decode_theme(&map),
            sub_habit_statuses: decode_statuses(&map),
            today_order: decode(&map, TODAY_ORDER_KEY).unwrap_or_default(),
            systems_order: decode(&map, SYSTEMS_ORDER_KEY).unwrap_or_default(),
        }
    }

    /// Writes every known key, keeping unrelated keys already in the file.
    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let mut map = self.read_map();
        map.insert(
            THEME_KEY.to_string(),
            Value::String(prefs.theme.as_str().to_string()),
        );
        map.insert(
            SUB_HABIT_STATUSES_KEY.to_string(),
            Value::Object(
                prefs
                    .sub_habit_statuses
                    .iter()
                    .map(|(id, status)| (id.clone(), Value::String(status.as_str().to_string())))
                    .collect(),
            ),
        );
        map.insert(
            TODAY_ORDER_KEY.to_string(),
            serde_json::to_value(&prefs.today_order)?,
        );
        map.insert(
            SYSTEMS_ORDER_KEY.to_string(),
            serde_json::to_value(&prefs.systems_order)?,
        );

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&self.path, body).map_err(|e| RoutineOsError::Storage(e.to_string()))
    }
}

use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#F97316";
pub const DEFAULT_ICON: &str = "✨";

/// A user-defined life category that groups habits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub order_index: i32,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: super::generate_id("system"),
            name: name.into(),
            description: String::new(),
            color: default_color(),
            icon: default_icon(),
            order_index: 0,
        }
    }
}

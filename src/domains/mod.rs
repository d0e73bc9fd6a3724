pub mod habit;
pub mod system;

pub use habit::{
    CompletionEntry, Frequency, Habit, HabitStatus, Purpose, SubHabit, TimeBlock,
};
pub use system::System;

/// Generates `<prefix>-<uuid>` identifiers for new records.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

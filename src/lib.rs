pub mod adapter;
pub mod analytics;
pub mod auth;
pub mod config;
pub mod daemon;
pub mod db;
pub mod domains;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod prefs;
pub mod providers;
pub mod recurrence;
pub mod runtime_paths;
pub mod services;
pub mod state;
pub mod status;
pub mod store;
pub mod vault;

pub type Result<T> = std::result::Result<T, error::RoutineOsError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_SHA: &str = env!("ROUTINE_OS_GIT_SHA");

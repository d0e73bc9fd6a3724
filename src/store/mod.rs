mod schema;
pub mod sqlite;
pub mod supabase;

use std::sync::Arc;

use crate::auth::Session;
use crate::config::{Config, StoreBackend};
use crate::error::{Result, RoutineOsError};
use crate::interfaces::store::HabitStore;

pub use sqlite::SqliteHabitStore;
pub use supabase::SupabaseStore;

/// Builds the store selected in `config`. The hosted backend needs a
/// signed-in session.
pub async fn open_store(config: &Config, session: Option<&Session>) -> Result<Arc<dyn HabitStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = config.sqlite_path();
            tracing::debug!(path = %path, "Opening local habit store");
            Ok(Arc::new(SqliteHabitStore::new(&path).await?))
        }
        StoreBackend::Supabase => {
            let (url, anon_key) = config
                .supabase
                .as_ref()
                .and_then(|supabase| supabase.endpoint())
                .ok_or_else(|| {
                    RoutineOsError::Config("supabase url and anon_key are required".to_string())
                })?;
            let session = session.ok_or_else(|| {
                RoutineOsError::Auth("sign in before using the hosted store".to_string())
            })?;
            Ok(Arc::new(SupabaseStore::new(url, anon_key, Some(session.clone()))))
        }
    }
}

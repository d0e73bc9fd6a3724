use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{Result, RoutineOsError};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";

pub type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
pub type SqlitePool = Pool<SqliteAsyncConn>;
pub type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

pub fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    }
    Ok(())
}

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    conn.batch_execute(CONNECTION_PRAGMAS)
        .map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    Ok(conn)
}

pub async fn apply_pragmas_async(conn: &mut SqliteAsyncConn) -> Result<()> {
    diesel_async::SimpleAsyncConnection::batch_execute(conn, CONNECTION_PRAGMAS)
        .await
        .map_err(|e| RoutineOsError::Storage(e.to_string()))
}

pub async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection_sync(&database_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| RoutineOsError::Storage(e.to_string()))?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "Applied database migrations");
        }
        Ok::<_, RoutineOsError>(())
    })
    .await
    .map_err(|e| RoutineOsError::Runtime(e.to_string()))??;
    Ok(())
}

/// Creates the parent directory, migrates, then opens a pool.
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    ensure_parent_dir(database_url)?;
    run_migrations(database_url).await?;
    let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(database_url);
    Pool::builder()
        .build(manager)
        .await
        .map_err(|e| RoutineOsError::Storage(e.to_string()))
}

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

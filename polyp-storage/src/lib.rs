//! polyp-storage: local SQLite persistence for examinations
//!
//! Nine tables describing doctors, patients, devices, sessions, captured
//! images, models and their outputs, plus a [`DbFrameSink`] that records a
//! running examination in the background.

pub mod error;
pub mod maintenance;
pub mod models;
pub mod recorder;
pub mod repositories;
pub mod schema;

pub use error::{Result, StorageError};
pub use maintenance::{reset_database, seed_defaults, SeedDefaults, SeedIds};
pub use recorder::{DbFrameSink, RecorderSettings};
pub use schema::init_database;

use models::{DbId, EndoscopeDeviceRecord};
use repositories::EndoscopeDeviceRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub type DbPool = sqlx::SqlitePool;

/// Open (and optionally create) the database file at `path`.
pub async fn create_pool(path: impl AsRef<Path>, create_if_missing: bool) -> Result<DbPool> {
    let options = SqliteConnectOptions::new()
        .filename(path.as_ref())
        .create_if_missing(create_if_missing)
        .foreign_keys(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// A private in-memory database. One connection, so every query sees the
/// same data.
pub async fn create_memory_pool() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn health_check(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Fetch one `EndoscopeDevice` row by id.
pub async fn query_endoscope_device(pool: &DbPool, id: DbId) -> Result<EndoscopeDeviceRecord> {
    EndoscopeDeviceRepo::find_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("EndoscopeDevice {}", id)))
}

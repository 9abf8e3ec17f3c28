//! Repository for the `DetectionModel` and `SegmentationModel` tables.

use crate::models::{DbId, ModelRecord};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, ModelName AS model_name, ModelVersion AS model_version";

/// Which of the two model tables to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Detection,
    Segmentation,
}

impl ModelKind {
    fn table(&self) -> &'static str {
        match self {
            ModelKind::Detection => "DetectionModel",
            ModelKind::Segmentation => "SegmentationModel",
        }
    }
}

pub struct ModelRepo;

impl ModelRepo {
    /// Insert a model row, returning the created row.
    pub async fn create(
        pool: &DbPool,
        kind: ModelKind,
        name: &str,
        version: &str,
    ) -> Result<ModelRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO {} (ModelName, ModelVersion)
             VALUES (?, ?)
             RETURNING {COLUMNS}",
            kind.table()
        );
        sqlx::query_as::<_, ModelRecord>(&query)
            .bind(name)
            .bind(version)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &DbPool,
        kind: ModelKind,
        id: DbId,
    ) -> Result<Option<ModelRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {} WHERE ID = ?", kind.table());
        sqlx::query_as::<_, ModelRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Oldest row with this name and version, if any.
    pub async fn find_by_name_version(
        pool: &DbPool,
        kind: ModelKind,
        name: &str,
        version: &str,
    ) -> Result<Option<ModelRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM {} WHERE ModelName = ? AND ModelVersion = ? ORDER BY ID LIMIT 1",
            kind.table()
        );
        sqlx::query_as::<_, ModelRecord>(&query)
            .bind(name)
            .bind(version)
            .fetch_optional(pool)
            .await
    }

    /// Return the existing row for `name`/`version`, inserting it if missing.
    ///
    /// The lookup and the insert are separate statements.
    pub async fn find_or_create(
        pool: &DbPool,
        kind: ModelKind,
        name: &str,
        version: &str,
    ) -> Result<ModelRecord, sqlx::Error> {
        if let Some(existing) = Self::find_by_name_version(pool, kind, name, version).await? {
            return Ok(existing);
        }
        Self::create(pool, kind, name, version).await
    }
}

//! Repository for the `EndoscopeDevice` table.

use crate::models::{CreateEndoscopeDevice, DbId, EndoscopeDeviceRecord};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, Model AS model, Location AS location";

pub struct EndoscopeDeviceRepo;

impl EndoscopeDeviceRepo {
    /// Insert a device, returning the created row.
    pub async fn create(
        pool: &DbPool,
        input: &CreateEndoscopeDevice,
    ) -> Result<EndoscopeDeviceRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO EndoscopeDevice (Model, Location)
             VALUES (?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EndoscopeDeviceRecord>(&query)
            .bind(&input.model)
            .bind(&input.location)
            .fetch_one(pool)
            .await
    }

    /// Look a device up by id.
    pub async fn find_by_id(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<EndoscopeDeviceRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM EndoscopeDevice WHERE ID = ?");
        sqlx::query_as::<_, EndoscopeDeviceRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<EndoscopeDeviceRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM EndoscopeDevice ORDER BY ID");
        sqlx::query_as::<_, EndoscopeDeviceRecord>(&query)
            .fetch_all(pool)
            .await
    }
}

//! Repository for the `ColonoscopySession` table.

use crate::models::{ColonoscopySession, CreateColonoscopySession, DbId};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, DoctorID AS doctor_id, PatientID AS patient_id, \
                       DeviceID AS device_id, SessionDateTime AS session_date_time";

pub struct ColonoscopySessionRepo;

impl ColonoscopySessionRepo {
    /// Insert a session, returning the created row.
    pub async fn create(
        pool: &DbPool,
        input: &CreateColonoscopySession,
    ) -> Result<ColonoscopySession, sqlx::Error> {
        let query = format!(
            "INSERT INTO ColonoscopySession (DoctorID, PatientID, DeviceID, SessionDateTime)
             VALUES (?, ?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ColonoscopySession>(&query)
            .bind(input.doctor_id)
            .bind(input.patient_id)
            .bind(input.device_id)
            .bind(input.session_date_time)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<ColonoscopySession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ColonoscopySession WHERE ID = ?");
        sqlx::query_as::<_, ColonoscopySession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent sessions first.
    pub async fn list_recent(
        pool: &DbPool,
        limit: i64,
    ) -> Result<Vec<ColonoscopySession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ColonoscopySession ORDER BY ID DESC LIMIT ?");
        sqlx::query_as::<_, ColonoscopySession>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

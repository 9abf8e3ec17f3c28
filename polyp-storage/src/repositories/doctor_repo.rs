//! Repository for the `Doctor` table.

use crate::models::{CreateDoctor, DbId, Doctor};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, Name AS name, Specialization AS specialization";

pub struct DoctorRepo;

impl DoctorRepo {
    /// Insert a doctor, returning the created row.
    pub async fn create(pool: &DbPool, input: &CreateDoctor) -> Result<Doctor, sqlx::Error> {
        let query = format!(
            "INSERT INTO Doctor (Name, Specialization)
             VALUES (?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Doctor>(&query)
            .bind(&input.name)
            .bind(&input.specialization)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Doctor>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM Doctor WHERE ID = ?");
        sqlx::query_as::<_, Doctor>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<Doctor>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM Doctor ORDER BY ID");
        sqlx::query_as::<_, Doctor>(&query).fetch_all(pool).await
    }
}

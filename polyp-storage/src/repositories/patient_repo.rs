//! Repository for the `Patient` table.

use crate::models::{CreatePatient, DbId, Patient};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, Name AS name, DateOfBirth AS date_of_birth, Gender AS gender";

pub struct PatientRepo;

impl PatientRepo {
    /// Insert a patient, returning the created row.
    pub async fn create(pool: &DbPool, input: &CreatePatient) -> Result<Patient, sqlx::Error> {
        let query = format!(
            "INSERT INTO Patient (Name, DateOfBirth, Gender)
             VALUES (?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(&input.name)
            .bind(&input.date_of_birth)
            .bind(&input.gender)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM Patient WHERE ID = ?");
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<Patient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM Patient ORDER BY ID");
        sqlx::query_as::<_, Patient>(&query).fetch_all(pool).await
    }
}

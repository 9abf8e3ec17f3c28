//! Repository for the `ColonoscopyImage` table.

use crate::models::{ColonoscopyImage, DbId};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, SessionID AS session_id, ImagePath AS image_path";

pub struct ColonoscopyImageRepo;

impl ColonoscopyImageRepo {
    /// Insert an image row, returning the created row.
    pub async fn create(
        pool: &DbPool,
        session_id: DbId,
        image_path: &str,
    ) -> Result<ColonoscopyImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO ColonoscopyImage (SessionID, ImagePath)
             VALUES (?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ColonoscopyImage>(&query)
            .bind(session_id)
            .bind(image_path)
            .fetch_one(pool)
            .await
    }

    pub async fn list_for_session(
        pool: &DbPool,
        session_id: DbId,
    ) -> Result<Vec<ColonoscopyImage>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ColonoscopyImage WHERE SessionID = ? ORDER BY ID");
        sqlx::query_as::<_, ColonoscopyImage>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }
}

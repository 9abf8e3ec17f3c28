//! Repository for the `DetectedPolyps` table.

use crate::models::{DbId, DetectedPolyps};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, ImageID AS image_id, DetectionModelID AS detection_model_id, Count AS count";

pub struct DetectedPolypsRepo;

impl DetectedPolypsRepo {
    /// Record how many polyps a model found in an image.
    pub async fn create(
        pool: &DbPool,
        image_id: DbId,
        detection_model_id: DbId,
        count: i64,
    ) -> Result<DetectedPolyps, sqlx::Error> {
        let query = format!(
            "INSERT INTO DetectedPolyps (ImageID, DetectionModelID, Count)
             VALUES (?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DetectedPolyps>(&query)
            .bind(image_id)
            .bind(detection_model_id)
            .bind(count)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_image(
        pool: &DbPool,
        image_id: DbId,
    ) -> Result<Vec<DetectedPolyps>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM DetectedPolyps WHERE ImageID = ? ORDER BY ID");
        sqlx::query_as::<_, DetectedPolyps>(&query)
            .bind(image_id)
            .fetch_all(pool)
            .await
    }
}

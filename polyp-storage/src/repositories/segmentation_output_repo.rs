//! Repository for the `SegmentationOutput` table.

use crate::models::{DbId, SegmentationOutput};
use crate::DbPool;

const COLUMNS: &str = "ID AS id, PolypID AS polyp_id, SegmentationModelID AS segmentation_model_id, \
                       ImagePath AS image_path";

pub struct SegmentationOutputRepo;

impl SegmentationOutputRepo {
    /// Insert a segmentation output, returning the created row.
    pub async fn create(
        pool: &DbPool,
        polyp_id: DbId,
        segmentation_model_id: DbId,
        image_path: &str,
    ) -> Result<SegmentationOutput, sqlx::Error> {
        let query = format!(
            "INSERT INTO SegmentationOutput (PolypID, SegmentationModelID, ImagePath)
             VALUES (?, ?, ?)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SegmentationOutput>(&query)
            .bind(polyp_id)
            .bind(segmentation_model_id)
            .bind(image_path)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_polyp(
        pool: &DbPool,
        polyp_id: DbId,
    ) -> Result<Vec<SegmentationOutput>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM SegmentationOutput WHERE PolypID = ? ORDER BY ID");
        sqlx::query_as::<_, SegmentationOutput>(&query)
            .bind(polyp_id)
            .fetch_all(pool)
            .await
    }
}

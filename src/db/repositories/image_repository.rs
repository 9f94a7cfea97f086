use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::stores::ImageStore;
use crate::error::{AppError, AppResult};
use crate::models::{Image, ImageScope};

const IMAGE_COLUMNS: &str = "id, user_id, folder_id, generation_id, url, prompt, generation_type, \
     product_image_url, model_image_url, credits_used, created_at";

#[derive(Debug, Clone)]
pub struct ImageRepository {
    pool: PgPool,
}

impl ImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageStore for ImageRepository {
    async fn list_images(&self, user_id: Uuid, scope: ImageScope, limit: i64, offset: i64) -> AppResult<Vec<Image>> {
        let query = format!(
            r#"
            SELECT {IMAGE_COLUMNS}
            FROM images
            WHERE user_id = $1 AND ($2::uuid IS NULL OR folder_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );

        sqlx::query_as::<_, Image>(&query)
            .bind(user_id)
            .bind(scope.folder_id())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list images: {}", e)))
    }

    async fn find_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<Option<Image>> {
        let query = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1 AND user_id = $2");

        sqlx::query_as::<_, Image>(&query)
            .bind(image_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch image: {}", e)))
    }

    async fn move_image(&self, user_id: Uuid, image_id: Uuid, folder_id: Option<Uuid>) -> AppResult<Option<Image>> {
        // The folder check sits in the same statement so a concurrent delete cannot slip between.
        let query = format!(
            r#"
            UPDATE images
            SET folder_id = $3
            WHERE id = $1
              AND user_id = $2
              AND ($3::uuid IS NULL OR EXISTS (
                  SELECT 1 FROM folders WHERE id = $3 AND user_id = $2
              ))
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Image>(&query)
            .bind(image_id)
            .bind(user_id)
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to move image: {}", e)))
    }

    async fn delete_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1 AND user_id = $2")
            .bind(image_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete image: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

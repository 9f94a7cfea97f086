use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::is_unique_violation;
use crate::db::stores::FolderStore;
use crate::error::{AppError, AppResult};
use crate::models::{Folder, FolderChanges, NewFolder};

pub const DUPLICATE_FOLDER_MESSAGE: &str = "A folder with this name already exists";

#[derive(Debug, Clone)]
pub struct FolderRepository {
    pool: PgPool,
}

impl FolderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_folder_error(error: sqlx::Error, action: &str) -> AppError {
    if is_unique_violation(&error) {
        AppError::Conflict(DUPLICATE_FOLDER_MESSAGE.to_string())
    } else {
        AppError::Database(format!("Failed to {} folder: {}", action, error))
    }
}

#[async_trait]
impl FolderStore for FolderRepository {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(
            r#"
            SELECT id, user_id, name, description, created_at, updated_at
            FROM folders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_folder_error(e, "list"))?;

        Ok(folders)
    }

    async fn find(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<Option<Folder>> {
        sqlx::query_as::<_, Folder>(
            r#"
            SELECT id, user_id, name, description, created_at, updated_at
            FROM folders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(folder_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_folder_error(e, "fetch"))
    }

    async fn create(&self, folder: &NewFolder) -> AppResult<Folder> {
        sqlx::query_as::<_, Folder>(
            r#"
            INSERT INTO folders (user_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, description, created_at, updated_at
            "#,
        )
        .bind(folder.user_id)
        .bind(&folder.name)
        .bind(&folder.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_folder_error(e, "create"))
    }

    async fn update(&self, user_id: Uuid, folder_id: Uuid, changes: &FolderChanges) -> AppResult<Option<Folder>> {
        sqlx::query_as::<_, Folder>(
            r#"
            UPDATE folders
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, description, created_at, updated_at
            "#,
        )
        .bind(folder_id)
        .bind(user_id)
        .bind(&changes.name)
        .bind(&changes.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_folder_error(e, "update"))
    }

    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1 AND user_id = $2")
            .bind(folder_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_folder_error(e, "delete"))?;

        Ok(result.rows_affected() > 0)
    }
}

use log::info;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::stores::{FolderStore, ImageStore};
use crate::error::{AppError, AppResult};
use crate::models::{Image, ImageScope};
use crate::services::audit_service::{AuditAction, AuditContext, AuditEvent, AuditResource, AuditService};
use crate::utils::validation::MoveImageInput;

pub const IMAGE_NOT_FOUND_MESSAGE: &str = "Image not found";
const FOLDER_NOT_FOUND_MESSAGE: &str = "Folder not found";

pub const DEFAULT_IMAGE_PAGE: i64 = 50;
pub const MAX_IMAGE_PAGE: i64 = 100;

/// Browsing and filing of a user's rendered images.
#[derive(Clone)]
pub struct ImageService {
    images: Arc<dyn ImageStore>,
    folders: Arc<dyn FolderStore>,
    audit: AuditService,
}

impl ImageService {
    pub fn new(images: Arc<dyn ImageStore>, folders: Arc<dyn FolderStore>, audit: AuditService) -> Self {
        Self { images, folders, audit }
    }

    pub async fn list(&self, user_id: Uuid, scope: ImageScope, limit: i64, offset: i64) -> AppResult<Vec<Image>> {
        self.images.list_images(user_id, scope, limit, offset).await
    }

    pub async fn move_to_folder(&self, user_id: Uuid, input: MoveImageInput, context: &AuditContext) -> AppResult<Image> {
        let current = self
            .images
            .find_image(user_id, input.image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(IMAGE_NOT_FOUND_MESSAGE.to_string()))?;

        if let Some(folder_id) = input.folder_id {
            if self.folders.find(user_id, folder_id).await?.is_none() {
                return Err(AppError::NotFound(FOLDER_NOT_FOUND_MESSAGE.to_string()));
            }
        }

        // Either side may have been deleted since the checks above.
        let image = self
            .images
            .move_image(user_id, input.image_id, input.folder_id)
            .await?
            .ok_or_else(|| AppError::NotFound(IMAGE_NOT_FOUND_MESSAGE.to_string()))?;

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::ImageMoved, AuditResource::Image)
                    .with_resource_id(image.id)
                    .with_metadata(json!({
                        "from_folder": current.folder_id,
                        "to_folder": image.folder_id,
                    })),
            )
            .await;

        Ok(image)
    }

    pub async fn delete(&self, user_id: Uuid, image_id: Uuid, context: &AuditContext) -> AppResult<()> {
        if !self.images.delete_image(user_id, image_id).await? {
            return Err(AppError::NotFound(IMAGE_NOT_FOUND_MESSAGE.to_string()));
        }

        info!("Image {} deleted by user {}", image_id, user_id);
        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::ImageDeleted, AuditResource::Image).with_resource_id(image_id),
            )
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewFolder, NewImage};

    fn service(store: &MemoryStore) -> ImageService {
        let shared = Arc::new(store.clone());
        ImageService::new(shared.clone(), shared.clone(), AuditService::new(shared))
    }

    fn render(user_id: Uuid) -> NewImage {
        NewImage {
            user_id,
            folder_id: None,
            generation_id: None,
            url: "https://cdn.example.com/out.png".to_string(),
            prompt: "Watch on a slate tray".to_string(),
            generation_type: "product_only".to_string(),
            product_image_url: None,
            model_image_url: None,
            credits_used: 5,
        }
    }

    #[tokio::test]
    async fn test_move_reports_missing_folder() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let image = store.insert_image(&render(user_id)).await;

        let result = service(&store)
            .move_to_folder(
                user_id,
                MoveImageInput {
                    image_id: image.id,
                    folder_id: Some(Uuid::new_v4()),
                },
                &AuditContext::new(user_id),
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(msg)) if msg == FOLDER_NOT_FOUND_MESSAGE));
    }

    #[tokio::test]
    async fn test_move_is_audited() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let folder = store
            .create(&NewFolder {
                user_id,
                name: "Watches".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let image = store.insert_image(&render(user_id)).await;
        let images = service(&store);

        let moved = images
            .move_to_folder(
                user_id,
                MoveImageInput {
                    image_id: image.id,
                    folder_id: Some(folder.id),
                },
                &AuditContext::new(user_id),
            )
            .await
            .unwrap();
        assert_eq!(moved.folder_id, Some(folder.id));

        let trail = images
            .audit
            .history_for(AuditResource::Image, &image.id.to_string())
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "image.moved");
        assert_eq!(trail[0].metadata["to_folder"], folder.id.to_string());
    }
}

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::stores::FolderStore;
use crate::error::{AppError, AppResult};
use crate::models::{Folder, FolderChanges, NewFolder};
use crate::services::audit_service::{AuditAction, AuditContext, AuditEvent, AuditResource, AuditService};
use crate::utils::validation::{CreateFolderInput, UpdateFolderInput};

const FOLDER_NOT_FOUND_MESSAGE: &str = "Folder not found";

#[derive(Clone)]
pub struct FolderService {
    folders: Arc<dyn FolderStore>,
    audit: AuditService,
}

impl FolderService {
    pub fn new(folders: Arc<dyn FolderStore>, audit: AuditService) -> Self {
        Self { folders, audit }
    }

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Folder>> {
        self.folders.list(user_id).await
    }

    pub async fn create(&self, user_id: Uuid, input: CreateFolderInput, context: &AuditContext) -> AppResult<Folder> {
        let folder = self
            .folders
            .create(&NewFolder {
                user_id,
                name: input.name,
                description: input.description.unwrap_or_default(),
            })
            .await?;

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::FolderCreated, AuditResource::Folder)
                    .with_resource_id(folder.id)
                    .with_metadata(json!({ "name": folder.name })),
            )
            .await;

        Ok(folder)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        input: UpdateFolderInput,
        context: &AuditContext,
    ) -> AppResult<Folder> {
        let changes = FolderChanges {
            name: input.name,
            description: input.description,
        };
        if changes.is_empty() {
            return Err(AppError::Validation("No changes provided".to_string()));
        }

        let folder = self
            .folders
            .update(user_id, folder_id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound(FOLDER_NOT_FOUND_MESSAGE.to_string()))?;

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::FolderUpdated, AuditResource::Folder)
                    .with_resource_id(folder.id)
                    .with_metadata(json!({
                        "name": folder.name,
                        "renamed": changes.name.is_some(),
                    })),
            )
            .await;

        Ok(folder)
    }

    pub async fn delete(&self, user_id: Uuid, folder_id: Uuid, context: &AuditContext) -> AppResult<()> {
        if !self.folders.delete(user_id, folder_id).await? {
            return Err(AppError::NotFound(FOLDER_NOT_FOUND_MESSAGE.to_string()));
        }

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::FolderDeleted, AuditResource::Folder).with_resource_id(folder_id),
            )
            .await;

        Ok(())
    }
}

use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::audit_service::AuditContext;
use crate::services::folder_service::FolderService;
use crate::utils::validation::{CreateFolderInput, UpdateFolderInput, validate_and_sanitize};

pub async fn list_folders(
    user: AuthenticatedUser,
    folder_service: web::Data<FolderService>,
) -> Result<HttpResponse, AppError> {
    let folders = folder_service.list(user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "folders": folders })))
}

pub async fn create_folder(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Json<serde_json::Value>,
    folder_service: web::Data<FolderService>,
) -> Result<HttpResponse, AppError> {
    let input: CreateFolderInput = validate_and_sanitize(&body, &())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let folder = folder_service.create(user.user_id, input, &context).await?;
    Ok(HttpResponse::Created().json(json!({ "folder": folder })))
}

pub async fn update_folder(
    req: HttpRequest,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<serde_json::Value>,
    folder_service: web::Data<FolderService>,
) -> Result<HttpResponse, AppError> {
    let input: UpdateFolderInput = validate_and_sanitize(&body, &())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let folder = folder_service
        .update(user.user_id, path.into_inner(), input, &context)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "folder": folder })))
}

pub async fn delete_folder(
    req: HttpRequest,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    folder_service: web::Data<FolderService>,
) -> Result<HttpResponse, AppError> {
    let context = AuditContext::from_request(&req, Some(user.user_id));
    folder_service.delete(user.user_id, path.into_inner(), &context).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, ImageScope};
use crate::services::audit_service::AuditContext;
use crate::services::image_service::{DEFAULT_IMAGE_PAGE, IMAGE_NOT_FOUND_MESSAGE, ImageService, MAX_IMAGE_PAGE};
use crate::services::payment_service::page_bounds;
use crate::utils::validation::{MoveImageInput, validate_and_sanitize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageListQuery {
    pub folder_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImageIdQuery {
    pub id: Option<String>,
}

/// List the user's images, newest first, optionally within one folder
pub async fn list_images(
    user: AuthenticatedUser,
    query: web::Query<ImageListQuery>,
    image_service: web::Data<ImageService>,
) -> Result<HttpResponse, AppError> {
    let scope = ImageScope::parse(query.folder_id.as_deref())
        .ok_or_else(|| AppError::Validation("Invalid folder ID".to_string()))?;
    let (limit, offset) = page_bounds(query.limit, query.offset, DEFAULT_IMAGE_PAGE, MAX_IMAGE_PAGE);

    let images = image_service.list(user.user_id, scope, limit, offset).await?;
    Ok(HttpResponse::Ok().json(json!({ "images": images })))
}

pub async fn move_image(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Json<serde_json::Value>,
    image_service: web::Data<ImageService>,
) -> Result<HttpResponse, AppError> {
    let input: MoveImageInput = validate_and_sanitize(&body, &())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let image = image_service.move_to_folder(user.user_id, input, &context).await?;
    Ok(HttpResponse::Ok().json(json!({ "image": image })))
}

pub async fn delete_image(
    req: HttpRequest,
    user: AuthenticatedUser,
    query: web::Query<ImageIdQuery>,
    image_service: web::Data<ImageService>,
) -> Result<HttpResponse, AppError> {
    let raw_id = query
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("Image ID is required".to_string()))?;
    // A malformed id cannot name one of the user's images.
    let image_id =
        Uuid::parse_str(raw_id).map_err(|_| AppError::NotFound(IMAGE_NOT_FOUND_MESSAGE.to_string()))?;

    let context = AuditContext::from_request(&req, Some(user.user_id));
    image_service.delete(user.user_id, image_id, &context).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

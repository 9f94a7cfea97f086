use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::audit_service::AuditContext;
use crate::services::credit_service::CreditService;
use crate::utils::validation::{GenerateImageInput, validate_and_sanitize};

/// Charge for a generation and queue it for the rendering worker
pub async fn create_generation(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Json<serde_json::Value>,
    credit_service: web::Data<CreditService>,
) -> Result<HttpResponse, AppError> {
    let input: GenerateImageInput = validate_and_sanitize(&body, &())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let charge = credit_service.charge_generation(&user, input, &context).await?;

    Ok(HttpResponse::Accepted().json(json!({
        "success": true,
        "generation": charge.generation,
        "creditsUsed": charge.credits_used,
        "remainingCredits": charge.remaining_credits,
    })))
}

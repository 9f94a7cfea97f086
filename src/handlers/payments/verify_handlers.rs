use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::audit_service::AuditContext;
use crate::services::payment_service::PaymentService;
use crate::utils::validation::{VerifyPaymentInput, validate_and_sanitize};

/// Confirm a checkout the client completed in the gateway widget
pub async fn verify_payment(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Json<serde_json::Value>,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse, AppError> {
    let input: VerifyPaymentInput = validate_and_sanitize(&body, &())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let result = payment_service.verify_payment(&user, input, &context).await?;

    let body = if result.already_processed {
        json!({
            "success": true,
            "message": "Payment already processed",
            "creditsAdded": result.credits_added,
            "paymentId": result.payment_id,
            "alreadyProcessed": true,
        })
    } else {
        json!({
            "success": true,
            "message": "Payment verified successfully",
            "creditsAdded": result.credits_added,
            "totalCredits": result.total_credits,
            "paymentId": result.payment_id,
            "alreadyProcessed": false,
        })
    };

    Ok(HttpResponse::Ok().json(body))
}

use actix_web::{HttpRequest, HttpResponse, web};
use bigdecimal::ToPrimitive;
use serde_json::json;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::audit_service::AuditContext;
use crate::services::payment_service::PaymentService;
use crate::services::razorpay_service::SETTLEMENT_CURRENCY;
use crate::utils::financial_validation::paise_to_rupees;
use crate::utils::validation::{CreatePaymentInput, validate_and_sanitize};

/// Create a gateway order for a credit purchase
pub async fn create_order(
    req: HttpRequest,
    user: AuthenticatedUser,
    body: web::Json<serde_json::Value>,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse, AppError> {
    let input: CreatePaymentInput = validate_and_sanitize(&body, payment_service.pricing())?;
    let context = AuditContext::from_request(&req, Some(user.user_id));

    let created = payment_service.create_order(&user, input, &context).await?;
    let order = &created.order;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "orderId": order.order_id,
        "amount": order.amount_usd.to_f64(),
        "amountInr": paise_to_rupees(order.amount_inr_paise).to_f64(),
        "currency": SETTLEMENT_CURRENCY,
        "credits": order.credits,
        "keyId": payment_service.gateway().key_id(),
        "paymentStage": order.payment_stage.as_str(),
        "prefill": {
            "name": created.user.full_name.clone().unwrap_or_default(),
            "email": created.user.email,
        },
        "notes": {
            "userId": user.user_id,
            "credits": order.credits,
        },
    })))
}

use actix_web::{HttpRequest, HttpResponse, web};
use log::debug;

use crate::error::AppError;
use crate::services::audit_service::AuditContext;
use crate::services::payment_service::PaymentService;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Gateway events. The body stays as raw bytes until the signature over them is checked.
pub async fn razorpay_webhook(
    req: HttpRequest,
    body: web::Bytes,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    debug!("Webhook received ({} bytes, signed: {})", body.len(), signature.is_some());

    let context = AuditContext::from_request(&req, None);
    let ack = payment_service.handle_webhook(&body, signature, &context).await?;

    Ok(HttpResponse::Ok().json(ack))
}

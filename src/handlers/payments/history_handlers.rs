use actix_web::{HttpResponse, web};
use serde_json::json;

use crate::error::AppError;
use crate::handlers::PaginationQuery;
use crate::models::AuthenticatedUser;
use crate::services::payment_service::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, PaymentService, page_bounds};

/// Newest-first purchase history for the signed-in user
pub async fn get_payment_history(
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse, AppError> {
    let (limit, offset) = page_bounds(query.limit, query.offset, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
    let (payments, total) = payment_service.payment_history(user.user_id, limit, offset).await?;

    Ok(HttpResponse::Ok().json(json!({
        "payments": payments,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

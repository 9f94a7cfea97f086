use actix_web::{HttpResponse, web};
use serde_json::json;

use crate::error::AppError;
use crate::handlers::PaginationQuery;
use crate::models::AuthenticatedUser;
use crate::services::credit_service::{CreditService, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::services::payment_service::page_bounds;

/// Get user's credit balance
pub async fn get_credit_balance(
    user: AuthenticatedUser,
    credit_service: web::Data<CreditService>,
) -> Result<HttpResponse, AppError> {
    let credits = credit_service.balance(user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "credits": credits })))
}

/// Get credit transaction history
pub async fn get_credit_history(
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
    credit_service: web::Data<CreditService>,
) -> Result<HttpResponse, AppError> {
    let (limit, offset) = page_bounds(query.limit, query.offset, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
    let (history, total) = credit_service.history(user.user_id, limit, offset).await?;

    Ok(HttpResponse::Ok().json(json!({
        "history": history,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

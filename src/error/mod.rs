use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use sqlx::error::Error as SqlxError;

use crate::middleware::rate_limiting::RateLimitDecision;

/// Message returned whenever a credit or payment failure needs a human to reconcile it.
pub const CONTACT_SUPPORT_MESSAGE: &str = "Failed to process payment. Please contact support.";

const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

#[derive(Debug)]
pub enum AppError {
    Database(String),
    Internal(String),
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Configuration(String),
    Validation(String),
    Signature(String),
    Gateway(String),
    LedgerConsistency(String),
    InsufficientCredits { required: i64, available: i64 },
    Conflict(String),
    TooManyRequests(RateLimitDecision),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    error_type: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            AppError::NotFound(e) => write!(f, "Not found: {}", e),
            AppError::BadRequest(e) => write!(f, "Bad request: {}", e),
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::Validation(e) => write!(f, "Validation error: {}", e),
            AppError::Signature(e) => write!(f, "Signature error: {}", e),
            AppError::Gateway(e) => write!(f, "Payment gateway error: {}", e),
            AppError::LedgerConsistency(e) => write!(f, "Ledger consistency error: {}", e),
            AppError::InsufficientCredits { required, available } => write!(
                f,
                "Insufficient credits: required {}, available {}",
                required, available
            ),
            AppError::Conflict(e) => write!(f, "Conflict: {}", e),
            AppError::TooManyRequests(decision) => write!(
                f,
                "Too many requests: limit {} reached, retry after {}s",
                decision.limit,
                decision.retry_after_secs()
            ),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Configuration(_) => "configuration_error",
            AppError::Validation(_) => "validation_error",
            AppError::Signature(_) => "signature_error",
            AppError::Gateway(_) => "gateway_error",
            AppError::LedgerConsistency(_) => "ledger_consistency_error",
            AppError::InsufficientCredits { .. } => "insufficient_credits",
            AppError::Conflict(_) => "conflict",
            AppError::TooManyRequests(_) => "rate_limit_exceeded",
        }
    }

    /// Message that is safe to show to the caller. Internal failures never leak their detail.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized(e)
            | AppError::NotFound(e)
            | AppError::BadRequest(e)
            | AppError::Validation(e)
            | AppError::Signature(e)
            | AppError::Conflict(e) => e.clone(),
            AppError::InsufficientCredits { .. } => "Insufficient credits".to_string(),
            AppError::TooManyRequests(_) => "Too many requests. Please try again later.".to_string(),
            AppError::LedgerConsistency(_) => CONTACT_SUPPORT_MESSAGE.to_string(),
            AppError::Database(_)
            | AppError::Internal(_)
            | AppError::Configuration(_)
            | AppError::Gateway(_) => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        match self {
            AppError::TooManyRequests(decision) => {
                let retry_after = decision.retry_after_secs();
                HttpResponse::build(status_code)
                    .insert_header(("Retry-After", retry_after.to_string()))
                    .json(serde_json::json!({
                        "error": self.user_message(),
                        "errorType": self.error_type(),
                        "code": "RATE_LIMIT_EXCEEDED",
                        "retryAfter": retry_after,
                        "limit": decision.limit,
                        "remaining": decision.remaining,
                        "resetAt": decision.reset_at.to_rfc3339(),
                    }))
            }
            AppError::InsufficientCredits { required, available } => HttpResponse::build(status_code)
                .json(serde_json::json!({
                    "error": self.user_message(),
                    "errorType": self.error_type(),
                    "required": required,
                    "available": available,
                })),
            _ => HttpResponse::build(status_code).json(ErrorResponse {
                error: self.user_message(),
                error_type: self.error_type().to_string(),
            }),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Signature(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LedgerConsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::NotFound("Record not found".to_string()),
            _ => AppError::Database(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON deserialization/serialization error: {}", error))
    }
}

impl From<crate::services::razorpay_service::RazorpayServiceError> for AppError {
    fn from(error: crate::services::razorpay_service::RazorpayServiceError) -> Self {
        use crate::services::razorpay_service::RazorpayServiceError;
        match error {
            RazorpayServiceError::Configuration(msg) => {
                AppError::Configuration(format!("Razorpay configuration error: {}", msg))
            }
            RazorpayServiceError::InvalidAmount(msg) => AppError::Validation(msg),
            other => AppError::Gateway(other.to_string()),
        }
    }
}

// Define AppResult type alias for Result<T, AppError>
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use chrono::{Duration, Utc};

    #[actix_rt::test]
    async fn test_internal_errors_do_not_leak_detail() {
        let error = AppError::Database("relation \"payments\" does not exist".to_string());
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], GENERIC_ERROR_MESSAGE);
        assert_eq!(json["errorType"], "database_error");
    }

    #[actix_rt::test]
    async fn test_rate_limit_response_carries_retry_after() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at: Utc::now() + Duration::seconds(30),
        };
        let response = AppError::TooManyRequests(decision).error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response
            .headers()
            .get("Retry-After")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 30);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(json["limit"], 10);
        assert_eq!(json["retryAfter"].as_u64().unwrap(), retry_after);
    }

    #[test]
    fn test_ledger_consistency_asks_for_support() {
        let error = AppError::LedgerConsistency("credit application failed".to_string());
        assert_eq!(error.user_message(), CONTACT_SUPPORT_MESSAGE);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let error: AppError = SqlxError::RowNotFound.into();
        assert!(matches!(error, AppError::NotFound(_)));
    }
}

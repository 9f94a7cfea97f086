use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Lifecycle of a purchase: `created -> completed | failed`, `completed -> refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Created, PaymentStatus::Completed)
                | (PaymentStatus::Created, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::Internal(format!("Unknown payment status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub razorpay_signature: Option<String>,
    pub amount_usd: BigDecimal,
    pub amount_inr: BigDecimal,
    pub credits_purchased: i64,
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_stage: String,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn status(&self) -> Result<PaymentStatus, AppError> {
        self.status.parse()
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub razorpay_order_id: String,
    pub amount_usd: BigDecimal,
    pub amount_inr: BigDecimal,
    pub credits_purchased: i64,
    pub payment_stage: String,
    pub metadata: serde_json::Value,
}

/// Everything needed to flip a payment to `completed` and credit its owner in one step.
#[derive(Debug, Clone)]
pub struct PaymentCompletion {
    pub payment_id: Uuid,
    pub razorpay_payment_id: String,
    pub razorpay_signature: Option<String>,
    pub payment_method: Option<String>,
    /// Merged into the stored metadata object.
    pub metadata: serde_json::Value,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// This call won the `created -> completed` transition and applied the credit.
    Completed { payment: Payment, new_balance: i64 },
    /// Another trigger already completed the payment; nothing was applied.
    AlreadyCompleted(Payment),
    /// The payment is in a state that can no longer complete (failed or refunded).
    NotCompletable(Payment),
}

#[derive(Debug, Clone)]
pub struct PaymentFailure {
    pub payment_id: Uuid,
    pub razorpay_payment_id: Option<String>,
    pub error_message: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PaymentRefund {
    pub payment_id: Uuid,
    pub metadata: serde_json::Value,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum RefundOutcome {
    /// Payment moved to `refunded`; `credits_deducted` may be less than purchased when the
    /// balance had already been spent.
    Refunded {
        payment: Payment,
        credits_deducted: i64,
        new_balance: i64,
    },
    /// Payment was not `completed` (duplicate or stale refund event).
    NotRefundable(Payment),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(PaymentStatus::Created.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Created.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));

        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Completed));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Completed));
        assert!(!PaymentStatus::Created.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Created,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("pending".parse::<PaymentStatus>().is_err());
    }
}

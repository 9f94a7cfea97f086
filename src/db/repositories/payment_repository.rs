use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CreditTransactionRepository, is_unique_violation};
use crate::db::stores::PaymentStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    CompletionOutcome, CreditTransactionType, LedgerEntry, NewPayment, Payment, PaymentCompletion,
    PaymentFailure, PaymentRefund, PaymentStatus, RefundOutcome,
};

const PAYMENT_COLUMNS: &str = "id, user_id, razorpay_order_id, razorpay_payment_id, razorpay_signature, \
    amount_usd, amount_inr, credits_purchased, status, payment_method, payment_stage, metadata, \
    error_message, created_at, updated_at, completed_at";

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
    ledger: CreditTransactionRepository,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CreditTransactionRepository::new(pool.clone()),
            pool,
        }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> AppResult<Option<Payment>> {
        let query = format!("SELECT {} FROM payments WHERE {} = $1", PAYMENT_COLUMNS, clause);
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch payment: {}", e)))?;
        Ok(payment)
    }

    async fn require_by_id(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert_payment(&self, payment: &NewPayment) -> AppResult<Payment> {
        let query = format!(
            r#"
            INSERT INTO payments
                (user_id, razorpay_order_id, amount_usd, amount_inr, credits_purchased, status, payment_stage, metadata)
            VALUES ($1, $2, $3, $4, $5, 'created', $6, $7)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, Payment>(&query)
            .bind(payment.user_id)
            .bind(&payment.razorpay_order_id)
            .bind(&payment.amount_usd)
            .bind(&payment.amount_inr)
            .bind(payment.credits_purchased)
            .bind(&payment.payment_stage)
            .bind(&payment.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Order {} is already recorded", payment.razorpay_order_id))
                } else {
                    AppError::Database(format!("Failed to create payment record: {}", e))
                }
            })
    }

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Payment>> {
        self.fetch_one_where("razorpay_order_id", razorpay_order_id).await
    }

    async fn find_by_order_id_for_user(&self, razorpay_order_id: &str, user_id: Uuid) -> AppResult<Option<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE razorpay_order_id = $1 AND user_id = $2",
            PAYMENT_COLUMNS
        );
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(razorpay_order_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch payment: {}", e)))?;
        Ok(payment)
    }

    async fn find_by_gateway_payment_id(&self, razorpay_payment_id: &str) -> AppResult<Option<Payment>> {
        self.fetch_one_where("razorpay_payment_id", razorpay_payment_id).await
    }

    async fn find_by_id(&self, payment_id: Uuid) -> AppResult<Option<Payment>> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch payment: {}", e)))?;
        Ok(payment)
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list payments: {}", e)))?;
        Ok(payments)
    }

    async fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn complete_and_credit(&self, completion: &PaymentCompletion) -> AppResult<CompletionOutcome> {
        let mut tx = self.pool.begin().await?;

        // Concurrent callers serialize on the row lock; whoever commits first flips the
        // status and the rest see zero rows once the WHERE is re-evaluated.
        let query = format!(
            r#"
            UPDATE payments
            SET status = 'completed',
                razorpay_payment_id = $2,
                razorpay_signature = COALESCE($3, razorpay_signature),
                payment_method = COALESCE($4, payment_method),
                metadata = metadata || $5,
                error_message = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'created'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let updated = sqlx::query_as::<_, Payment>(&query)
            .bind(completion.payment_id)
            .bind(&completion.razorpay_payment_id)
            .bind(&completion.razorpay_signature)
            .bind(&completion.payment_method)
            .bind(&completion.metadata)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to complete payment: {}", e)))?;

        let Some(payment) = updated else {
            tx.rollback().await?;
            let current = self.require_by_id(completion.payment_id).await?;
            return Ok(if current.is_completed() {
                CompletionOutcome::AlreadyCompleted(current)
            } else {
                CompletionOutcome::NotCompletable(current)
            });
        };

        let entry = LedgerEntry::new(
            payment.user_id,
            payment.credits_purchased,
            CreditTransactionType::Purchase,
            completion.description.clone(),
        )
        .with_payment(payment.id);
        let receipt = self.ledger.credit_with_executor(&entry, &mut tx).await?;

        tx.commit().await?;

        Ok(CompletionOutcome::Completed {
            payment,
            new_balance: receipt.balance,
        })
    }

    async fn mark_failed(&self, failure: &PaymentFailure) -> AppResult<Option<Payment>> {
        let query = format!(
            r#"
            UPDATE payments
            SET status = 'failed',
                error_message = $2,
                razorpay_payment_id = COALESCE($3, razorpay_payment_id),
                metadata = metadata || $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'created'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(failure.payment_id)
            .bind(&failure.error_message)
            .bind(&failure.razorpay_payment_id)
            .bind(&failure.metadata)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark payment as failed: {}", e)))?;

        Ok(payment)
    }

    async fn refund_and_debit(&self, refund: &PaymentRefund) -> AppResult<RefundOutcome> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE payments
            SET status = 'refunded',
                metadata = metadata || $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'completed'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let updated = sqlx::query_as::<_, Payment>(&query)
            .bind(refund.payment_id)
            .bind(&refund.metadata)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark payment as refunded: {}", e)))?;

        let Some(payment) = updated else {
            tx.rollback().await?;
            return Ok(RefundOutcome::NotRefundable(self.require_by_id(refund.payment_id).await?));
        };

        let balance: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1 FOR UPDATE")
            .bind(payment.user_id)
            .fetch_one(&mut *tx)
            .await?;

        // Credits already spent cannot be clawed back; the balance floors at zero.
        let credits_deducted = balance.min(payment.credits_purchased);
        let new_balance = if credits_deducted > 0 {
            let entry = LedgerEntry::new(
                payment.user_id,
                credits_deducted,
                CreditTransactionType::Refund,
                refund.description.clone(),
            )
            .with_payment(payment.id);
            self.ledger.debit_with_executor(&entry, &mut tx).await?.balance
        } else {
            balance
        };

        tx.commit().await?;

        Ok(RefundOutcome::Refunded {
            payment,
            credits_deducted,
            new_balance,
        })
    }

    async fn find_stale_created(&self, older_than: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE status = $1 AND created_at < $2 ORDER BY created_at ASC LIMIT $3",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&query)
            .bind(PaymentStatus::Created.as_str())
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find stale payments: {}", e)))?;
        Ok(payments)
    }
}

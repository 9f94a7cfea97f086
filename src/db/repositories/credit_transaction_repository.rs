use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::stores::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::models::{BalanceDiscrepancy, CreditTransaction, LedgerEntry, LedgerReceipt};

#[derive(Debug, Clone)]
pub struct CreditTransactionRepository {
    pool: PgPool,
}

impl CreditTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds `entry.amount` to the balance and appends the ledger row inside the caller's transaction.
    pub async fn credit_with_executor(
        &self,
        entry: &LedgerEntry,
        executor: &mut Transaction<'_, Postgres>,
    ) -> AppResult<LedgerReceipt> {
        ensure_positive(entry)?;

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits = credits + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING credits
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.amount)
        .fetch_optional(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to credit user balance: {}", e)))?;

        let balance = balance.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let transaction = self.insert_transaction_with_executor(entry, entry.amount, executor).await?;

        Ok(LedgerReceipt { transaction, balance })
    }

    /// Subtracts `entry.amount` only if the balance covers it. The guard lives in the
    /// UPDATE itself so concurrent debits can never take the balance below zero.
    pub async fn debit_with_executor(
        &self,
        entry: &LedgerEntry,
        executor: &mut Transaction<'_, Postgres>,
    ) -> AppResult<LedgerReceipt> {
        ensure_positive(entry)?;

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits = credits - $2, updated_at = NOW()
            WHERE id = $1 AND credits >= $2
            RETURNING credits
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.amount)
        .fetch_optional(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to debit user balance: {}", e)))?;

        let balance = match balance {
            Some(balance) => balance,
            None => {
                let available: Option<i64> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
                    .bind(entry.user_id)
                    .fetch_optional(&mut **executor)
                    .await?;

                return match available {
                    Some(available) => Err(AppError::InsufficientCredits {
                        required: entry.amount,
                        available,
                    }),
                    None => Err(AppError::NotFound("User not found".to_string())),
                };
            }
        };

        let transaction = self.insert_transaction_with_executor(entry, -entry.amount, executor).await?;

        Ok(LedgerReceipt { transaction, balance })
    }

    async fn insert_transaction_with_executor(
        &self,
        entry: &LedgerEntry,
        signed_amount: i64,
        executor: &mut Transaction<'_, Postgres>,
    ) -> AppResult<CreditTransaction> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions
                (user_id, amount, transaction_type, description, payment_id, generation_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, amount, transaction_type, description, payment_id, generation_id, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(signed_amount)
        .bind(entry.transaction_type.as_str())
        .bind(&entry.description)
        .bind(entry.payment_id)
        .bind(entry.generation_id)
        .fetch_one(&mut **executor)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create credit transaction: {}", e)))
    }
}

fn ensure_positive(entry: &LedgerEntry) -> AppResult<()> {
    if entry.amount <= 0 {
        return Err(AppError::Internal(format!(
            "Ledger amount must be positive, got {}",
            entry.amount
        )));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for CreditTransactionRepository {
    async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        balance.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn credit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        let mut tx = self.pool.begin().await?;
        let receipt = self.credit_with_executor(entry, &mut tx).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn debit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        let mut tx = self.pool.begin().await?;
        let receipt = self.debit_with_executor(entry, &mut tx).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn transactions(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT id, user_id, amount, transaction_type, description, payment_id, generation_id, created_at
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get credit transaction history: {}", e)))?;

        Ok(rows)
    }

    async fn count_transactions(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_discrepancies(&self) -> AppResult<Vec<BalanceDiscrepancy>> {
        let rows = sqlx::query_as::<_, BalanceDiscrepancy>(
            r#"
            SELECT u.id AS user_id,
                   u.credits AS stored_balance,
                   COALESCE(SUM(ct.amount), 0)::BIGINT AS ledger_balance,
                   COUNT(ct.id) AS transaction_count
            FROM users u
            LEFT JOIN credit_transactions ct ON ct.user_id = u.id
            GROUP BY u.id, u.credits
            HAVING u.credits <> COALESCE(SUM(ct.amount), 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to reconcile credit balances: {}", e)))?;

        Ok(rows)
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use super::CreditTransactionRepository;
use crate::db::stores::GenerationStore;
use crate::error::{AppError, AppResult};
use crate::models::{CreditTransactionType, GenerationRequest, LedgerEntry, LedgerReceipt, NewGenerationRequest};

#[derive(Debug, Clone)]
pub struct GenerationRepository {
    pool: PgPool,
    ledger: CreditTransactionRepository,
}

impl GenerationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CreditTransactionRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl GenerationStore for GenerationRepository {
    async fn charge_generation(
        &self,
        request: &NewGenerationRequest,
        description: &str,
    ) -> AppResult<(GenerationRequest, LedgerReceipt)> {
        let mut tx = self.pool.begin().await?;

        let generation = sqlx::query_as::<_, GenerationRequest>(
            r#"
            INSERT INTO generation_requests
                (user_id, prompt, product_image_url, model_image_url, generation_type, num_variations, credits_charged)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, prompt, product_image_url, model_image_url, generation_type,
                      num_variations, credits_charged, status, created_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.prompt)
        .bind(&request.product_image_url)
        .bind(&request.model_image_url)
        .bind(request.generation_type.as_str())
        .bind(request.num_variations)
        .bind(request.credits_charged)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create generation request: {}", e)))?;

        // Dropping the transaction on InsufficientCredits discards the request row too.
        let entry = LedgerEntry::new(
            request.user_id,
            request.credits_charged,
            CreditTransactionType::Usage,
            description,
        )
        .with_generation(generation.id);
        let receipt = self.ledger.debit_with_executor(&entry, &mut tx).await?;

        tx.commit().await?;
        Ok((generation, receipt))
    }
}

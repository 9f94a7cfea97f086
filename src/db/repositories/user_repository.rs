use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::CreditTransactionRepository;
use crate::db::stores::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::{CreditTransactionType, LedgerEntry, NewUser, User};

pub const SIGNUP_BONUS_DESCRIPTION: &str = "Welcome bonus";

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
    ledger: CreditTransactionRepository,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CreditTransactionRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, full_name, avatar_url, credits, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch user: {}", e)))?;

        Ok(user)
    }

    async fn ensure_user(&self, new_user: &NewUser, signup_bonus: i64) -> AppResult<(User, bool)> {
        let mut tx = self.pool.begin().await?;

        // Starts at zero; the bonus goes through the ledger so balance and history agree.
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, full_name, avatar_url, credits)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, email, full_name, avatar_url, credits, created_at, updated_at
            "#,
        )
        .bind(new_user.id)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(&new_user.avatar_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create user: {}", e)))?;

        match inserted {
            Some(mut user) => {
                if signup_bonus > 0 {
                    let entry = LedgerEntry::new(
                        user.id,
                        signup_bonus,
                        CreditTransactionType::Bonus,
                        SIGNUP_BONUS_DESCRIPTION,
                    );
                    let receipt = self.ledger.credit_with_executor(&entry, &mut tx).await?;
                    user.credits = receipt.balance;
                }
                tx.commit().await?;
                log::info!("Created user {} with {} signup credits", user.id, user.credits);
                Ok((user, true))
            }
            None => {
                tx.commit().await?;
                let user = self
                    .find_user(new_user.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
                Ok((user, false))
            }
        }
    }
}

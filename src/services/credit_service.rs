use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::settings::CreditsConfig;
use crate::db::stores::{GenerationStore, LedgerStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthenticatedUser, CreditTransaction, GenerationRequest, GenerationType, LedgerReceipt,
    NewGenerationRequest,
};
use crate::services::audit_service::{AuditAction, AuditContext, AuditEvent, AuditResource, AuditService};
use crate::utils::validation::GenerateImageInput;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct GenerationCharge {
    pub generation: GenerationRequest,
    pub credits_used: i64,
    pub remaining_credits: i64,
}

/// Balance queries and usage charges against the credit ledger.
#[derive(Clone)]
pub struct CreditService {
    ledger: Arc<dyn LedgerStore>,
    generations: Arc<dyn GenerationStore>,
    audit: AuditService,
    pricing: CreditsConfig,
}

impl CreditService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        generations: Arc<dyn GenerationStore>,
        audit: AuditService,
        pricing: CreditsConfig,
    ) -> Self {
        Self {
            ledger,
            generations,
            audit,
            pricing,
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        self.ledger.balance(user_id).await
    }

    pub async fn history(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<CreditTransaction>, i64)> {
        let history = self.ledger.transactions(user_id, limit, offset).await?;
        let total = self.ledger.count_transactions(user_id).await?;
        Ok((history, total))
    }

    pub fn generation_cost(&self, num_variations: i32) -> i64 {
        self.pricing.credits_per_generation * i64::from(num_variations)
    }

    /// Charges for an image generation and queues it as a pending request.
    pub async fn charge_generation(
        &self,
        user: &AuthenticatedUser,
        input: GenerateImageInput,
        context: &AuditContext,
    ) -> AppResult<GenerationCharge> {
        let required = self.generation_cost(input.num_variations);
        let request = NewGenerationRequest {
            user_id: user.user_id,
            generation_type: GenerationType::for_model_image(input.model_image_url.as_deref()),
            prompt: input.prompt,
            product_image_url: input.product_image_url,
            model_image_url: input.model_image_url,
            num_variations: input.num_variations,
            credits_charged: required,
        };
        let description = format!(
            "Image generation ({} variation{})",
            request.num_variations,
            if request.num_variations == 1 { "" } else { "s" }
        );

        let (generation, receipt): (GenerationRequest, LedgerReceipt) =
            match self.generations.charge_generation(&request, &description).await {
                Ok(charged) => charged,
                Err(AppError::InsufficientCredits { required, available }) => {
                    warn!(
                        "User {} needs {} credits for generation but has {}",
                        user.user_id, required, available
                    );
                    return Err(AppError::InsufficientCredits { required, available });
                }
                Err(e) => return Err(e),
            };

        info!(
            "Charged {} credits to user {} for generation {} (balance {})",
            required, user.user_id, generation.id, receipt.balance
        );

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::CreditsUsed, AuditResource::Image)
                    .with_resource_id(generation.id)
                    .with_metadata(json!({
                        "credits_used": required,
                        "num_variations": generation.num_variations,
                        "generation_type": generation.generation_type,
                        "remaining_credits": receipt.balance,
                    })),
            )
            .await;

        Ok(GenerationCharge {
            generation,
            credits_used: required,
            remaining_credits: receipt.balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::stores::UserStore;
    use crate::models::NewUser;

    async fn service_with_balance(balance: i64) -> (CreditService, AuthenticatedUser, MemoryStore) {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .ensure_user(
                &NewUser {
                    id: user_id,
                    email: "artist@example.com".to_string(),
                    full_name: None,
                    avatar_url: None,
                },
                balance,
            )
            .await
            .unwrap();

        let shared = Arc::new(store.clone());
        let service = CreditService::new(
            shared.clone(),
            shared.clone(),
            AuditService::new(shared),
            CreditsConfig::default(),
        );
        let user = AuthenticatedUser {
            user_id,
            email: "artist@example.com".to_string(),
            full_name: None,
        };
        (service, user, store)
    }

    fn input(num_variations: i32) -> GenerateImageInput {
        GenerateImageInput {
            prompt: "Sneaker on a marble plinth".to_string(),
            product_image_url: "https://cdn.example.com/shoe.png".to_string(),
            model_image_url: None,
            num_variations,
        }
    }

    #[tokio::test]
    async fn test_charge_debits_cost_per_variation() {
        let (service, user, store) = service_with_balance(100).await;
        let charge = service
            .charge_generation(&user, input(4), &AuditContext::new(user.user_id))
            .await
            .unwrap();

        assert_eq!(charge.credits_used, 20);
        assert_eq!(charge.remaining_credits, 80);
        assert_eq!(charge.generation.status, "pending");
        assert_eq!(charge.generation.generation_type, "product_only");

        let transactions = store.all_transactions(user.user_id).await;
        let usage = transactions.iter().find(|t| t.transaction_type == "usage").unwrap();
        assert_eq!(usage.amount, -20);
        assert_eq!(usage.generation_id, Some(charge.generation.id));
    }

    #[tokio::test]
    async fn test_insufficient_balance_charges_nothing() {
        let (service, user, _store) = service_with_balance(12).await;
        let err = service
            .charge_generation(&user, input(3), &AuditContext::new(user.user_id))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientCredits { required: 15, available: 12 }));
        assert_eq!(service.balance(user.user_id).await.unwrap(), 12);
    }
}

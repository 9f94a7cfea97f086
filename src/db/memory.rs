use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repositories::folder_repository::DUPLICATE_FOLDER_MESSAGE;
use super::repositories::user_repository::SIGNUP_BONUS_DESCRIPTION;
use super::stores::{
    AuditStore, FolderStore, GenerationStore, ImageStore, LedgerStore, PaymentStore, UserStore,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditLog, BalanceDiscrepancy, CompletionOutcome, CreditTransaction, CreditTransactionType,
    Folder, FolderChanges, GenerationRequest, Image, ImageScope, LedgerEntry, LedgerReceipt, NewAuditLog, NewFolder,
    NewGenerationRequest, NewImage, NewPayment, NewUser, Payment, PaymentCompletion, PaymentFailure,
    PaymentRefund, PaymentStatus, RefundOutcome, User,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    payments: Vec<Payment>,
    transactions: Vec<CreditTransaction>,
    audit_logs: Vec<AuditLog>,
    folders: Vec<Folder>,
    generations: Vec<GenerationRequest>,
    images: Vec<Image>,
}

impl MemoryState {
    fn user_mut(&mut self, user_id: Uuid) -> AppResult<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    fn payment_mut(&mut self, payment_id: Uuid) -> AppResult<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))
    }

    fn apply_credit(&mut self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        ensure_positive(entry)?;
        let user = self.user_mut(entry.user_id)?;
        user.credits += entry.amount;
        user.updated_at = Utc::now();
        let balance = user.credits;
        let transaction = self.append_transaction(entry, entry.amount);
        Ok(LedgerReceipt { transaction, balance })
    }

    fn apply_debit(&mut self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        ensure_positive(entry)?;
        let user = self.user_mut(entry.user_id)?;
        if user.credits < entry.amount {
            return Err(AppError::InsufficientCredits {
                required: entry.amount,
                available: user.credits,
            });
        }
        user.credits -= entry.amount;
        user.updated_at = Utc::now();
        let balance = user.credits;
        let transaction = self.append_transaction(entry, -entry.amount);
        Ok(LedgerReceipt { transaction, balance })
    }

    fn append_transaction(&mut self, entry: &LedgerEntry, signed_amount: i64) -> CreditTransaction {
        let transaction = CreditTransaction {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            amount: signed_amount,
            transaction_type: entry.transaction_type.as_str().to_string(),
            description: Some(entry.description.clone()),
            payment_id: entry.payment_id,
            generation_id: entry.generation_id,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        transaction
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

/// Shallow JSON object merge, matching Postgres `jsonb || jsonb`.
fn merge_metadata(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        (None, Some(_)) => *target = patch.clone(),
        _ => {}
    }
}

fn page<T: Clone>(items: impl DoubleEndedIterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .rev()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// Process-local store backing every store trait. A single mutex guards all tables,
/// so each method is one atomic unit of work, the same guarantee a database
/// transaction gives the Postgres repositories.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a stored balance without writing a ledger row. Used to rehearse
    /// reconciliation against a drifted account.
    pub async fn force_balance(&self, user_id: Uuid, credits: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.user_mut(user_id)?.credits = credits;
        Ok(())
    }

    /// Moves a payment's creation time, e.g. to age an order past the expiry window.
    pub async fn backdate_payment(&self, payment_id: Uuid, created_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.payment_mut(payment_id)?.created_at = created_at;
        Ok(())
    }

    /// Stores a rendered image the way the rendering worker would.
    pub async fn insert_image(&self, image: &NewImage) -> Image {
        let record = Image {
            id: Uuid::new_v4(),
            user_id: image.user_id,
            folder_id: image.folder_id,
            generation_id: image.generation_id,
            url: image.url.clone(),
            prompt: image.prompt.clone(),
            generation_type: image.generation_type.clone(),
            product_image_url: image.product_image_url.clone(),
            model_image_url: image.model_image_url.clone(),
            credits_used: image.credits_used,
            created_at: Utc::now(),
        };
        self.state.lock().await.images.push(record.clone());
        record
    }

    pub async fn audit_entries(&self) -> Vec<AuditLog> {
        self.state.lock().await.audit_logs.clone()
    }

    pub async fn all_transactions(&self, user_id: Uuid) -> Vec<CreditTransaction> {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn ensure_user(&self, new_user: &NewUser, signup_bonus: i64) -> AppResult<(User, bool)> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get(&new_user.id) {
            return Ok((user.clone(), false));
        }

        let now = Utc::now();
        state.users.insert(
            new_user.id,
            User {
                id: new_user.id,
                email: new_user.email.clone(),
                full_name: new_user.full_name.clone(),
                avatar_url: new_user.avatar_url.clone(),
                credits: 0,
                created_at: now,
                updated_at: now,
            },
        );

        if signup_bonus > 0 {
            let entry = LedgerEntry::new(
                new_user.id,
                signup_bonus,
                CreditTransactionType::Bonus,
                SIGNUP_BONUS_DESCRIPTION,
            );
            state.apply_credit(&entry)?;
        }

        let user = state.user_mut(new_user.id)?.clone();
        Ok((user, true))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        let mut state = self.state.lock().await;
        Ok(state.user_mut(user_id)?.credits)
    }

    async fn credit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        self.state.lock().await.apply_credit(entry)
    }

    async fn debit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt> {
        self.state.lock().await.apply_debit(entry)
    }

    async fn transactions(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<CreditTransaction>> {
        let state = self.state.lock().await;
        let rows = state.transactions.iter().filter(|t| t.user_id == user_id).cloned();
        Ok(page(rows.collect::<Vec<_>>().into_iter(), limit, offset))
    }

    async fn count_transactions(&self, user_id: Uuid) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().filter(|t| t.user_id == user_id).count() as i64)
    }

    async fn find_discrepancies(&self) -> AppResult<Vec<BalanceDiscrepancy>> {
        let state = self.state.lock().await;
        let mut discrepancies = Vec::new();

        for user in state.users.values() {
            let (ledger_balance, transaction_count) = state
                .transactions
                .iter()
                .filter(|t| t.user_id == user.id)
                .fold((0i64, 0i64), |(sum, count), t| (sum + t.amount, count + 1));

            if ledger_balance != user.credits {
                discrepancies.push(BalanceDiscrepancy {
                    user_id: user.id,
                    stored_balance: user.credits,
                    ledger_balance,
                    transaction_count,
                });
            }
        }

        Ok(discrepancies)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &NewPayment) -> AppResult<Payment> {
        let mut state = self.state.lock().await;
        if state
            .payments
            .iter()
            .any(|p| p.razorpay_order_id == payment.razorpay_order_id)
        {
            return Err(AppError::Conflict(format!(
                "Order {} is already recorded",
                payment.razorpay_order_id
            )));
        }
        if !state.users.contains_key(&payment.user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let now = Utc::now();
        let record = Payment {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            razorpay_order_id: payment.razorpay_order_id.clone(),
            razorpay_payment_id: None,
            razorpay_signature: None,
            amount_usd: payment.amount_usd.clone(),
            amount_inr: payment.amount_inr.clone(),
            credits_purchased: payment.credits_purchased,
            status: PaymentStatus::Created.as_str().to_string(),
            payment_method: None,
            payment_stage: payment.payment_stage.clone(),
            metadata: payment.metadata.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.payments.push(record.clone());
        Ok(record)
    }

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.razorpay_order_id == razorpay_order_id)
            .cloned())
    }

    async fn find_by_order_id_for_user(&self, razorpay_order_id: &str, user_id: Uuid) -> AppResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.razorpay_order_id == razorpay_order_id && p.user_id == user_id)
            .cloned())
    }

    async fn find_by_gateway_payment_id(&self, razorpay_payment_id: &str) -> AppResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.razorpay_payment_id.as_deref() == Some(razorpay_payment_id))
            .cloned())
    }

    async fn find_by_id(&self, payment_id: Uuid) -> AppResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state.payments.iter().find(|p| p.id == payment_id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let rows: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        Ok(page(rows.into_iter(), limit, offset))
    }

    async fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.payments.iter().filter(|p| p.user_id == user_id).count() as i64)
    }

    async fn complete_and_credit(&self, completion: &PaymentCompletion) -> AppResult<CompletionOutcome> {
        let mut state = self.state.lock().await;
        let current = state.payment_mut(completion.payment_id)?.clone();

        if !current.status()?.can_transition_to(PaymentStatus::Completed) {
            return Ok(if current.is_completed() {
                CompletionOutcome::AlreadyCompleted(current)
            } else {
                CompletionOutcome::NotCompletable(current)
            });
        }

        let entry = LedgerEntry::new(
            current.user_id,
            current.credits_purchased,
            CreditTransactionType::Purchase,
            completion.description.clone(),
        )
        .with_payment(current.id);
        let receipt = state.apply_credit(&entry)?;

        let now = Utc::now();
        let payment = state.payment_mut(completion.payment_id)?;
        payment.status = PaymentStatus::Completed.as_str().to_string();
        payment.razorpay_payment_id = Some(completion.razorpay_payment_id.clone());
        if completion.razorpay_signature.is_some() {
            payment.razorpay_signature = completion.razorpay_signature.clone();
        }
        if completion.payment_method.is_some() {
            payment.payment_method = completion.payment_method.clone();
        }
        merge_metadata(&mut payment.metadata, &completion.metadata);
        payment.error_message = None;
        payment.completed_at = Some(now);
        payment.updated_at = now;

        Ok(CompletionOutcome::Completed {
            payment: payment.clone(),
            new_balance: receipt.balance,
        })
    }

    async fn mark_failed(&self, failure: &PaymentFailure) -> AppResult<Option<Payment>> {
        let mut state = self.state.lock().await;
        let payment = state.payment_mut(failure.payment_id)?;

        if !payment.status()?.can_transition_to(PaymentStatus::Failed) {
            return Ok(None);
        }

        payment.status = PaymentStatus::Failed.as_str().to_string();
        payment.error_message = Some(failure.error_message.clone());
        if failure.razorpay_payment_id.is_some() {
            payment.razorpay_payment_id = failure.razorpay_payment_id.clone();
        }
        merge_metadata(&mut payment.metadata, &failure.metadata);
        payment.updated_at = Utc::now();

        Ok(Some(payment.clone()))
    }

    async fn refund_and_debit(&self, refund: &PaymentRefund) -> AppResult<RefundOutcome> {
        let mut state = self.state.lock().await;
        let current = state.payment_mut(refund.payment_id)?.clone();

        if !current.status()?.can_transition_to(PaymentStatus::Refunded) {
            return Ok(RefundOutcome::NotRefundable(current));
        }

        let balance = state.user_mut(current.user_id)?.credits;
        let credits_deducted = balance.min(current.credits_purchased);
        let new_balance = if credits_deducted > 0 {
            let entry = LedgerEntry::new(
                current.user_id,
                credits_deducted,
                CreditTransactionType::Refund,
                refund.description.clone(),
            )
            .with_payment(current.id);
            state.apply_debit(&entry)?.balance
        } else {
            balance
        };

        let payment = state.payment_mut(refund.payment_id)?;
        payment.status = PaymentStatus::Refunded.as_str().to_string();
        merge_metadata(&mut payment.metadata, &refund.metadata);
        payment.updated_at = Utc::now();

        Ok(RefundOutcome::Refunded {
            payment: payment.clone(),
            credits_deducted,
            new_balance,
        })
    }

    async fn find_stale_created(&self, older_than: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut stale: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Created.as_str() && p.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert(&self, entry: &NewAuditLog) -> AppResult<AuditLog> {
        let log = AuditLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action.clone(),
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
            status: entry.status.clone(),
            ip_address: entry.ip_address,
            user_agent: entry.user_agent.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        };
        self.state.lock().await.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn list_for_resource(&self, resource_type: &str, resource_id: &str) -> AppResult<Vec<AuditLog>> {
        let state = self.state.lock().await;
        Ok(state
            .audit_logs
            .iter()
            .filter(|l| l.resource_type == resource_type && l.resource_id.as_deref() == Some(resource_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FolderStore for MemoryStore {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Folder>> {
        let state = self.state.lock().await;
        Ok(state
            .folders
            .iter()
            .rev()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<Option<Folder>> {
        let state = self.state.lock().await;
        Ok(state
            .folders
            .iter()
            .find(|f| f.id == folder_id && f.user_id == user_id)
            .cloned())
    }

    async fn create(&self, folder: &NewFolder) -> AppResult<Folder> {
        let mut state = self.state.lock().await;
        if state
            .folders
            .iter()
            .any(|f| f.user_id == folder.user_id && f.name == folder.name)
        {
            return Err(AppError::Conflict(DUPLICATE_FOLDER_MESSAGE.to_string()));
        }

        let now = Utc::now();
        let record = Folder {
            id: Uuid::new_v4(),
            user_id: folder.user_id,
            name: folder.name.clone(),
            description: folder.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.folders.push(record.clone());
        Ok(record)
    }

    async fn update(&self, user_id: Uuid, folder_id: Uuid, changes: &FolderChanges) -> AppResult<Option<Folder>> {
        let mut state = self.state.lock().await;

        if let Some(name) = &changes.name {
            let taken = state
                .folders
                .iter()
                .any(|f| f.user_id == user_id && f.id != folder_id && &f.name == name);
            if taken {
                return Err(AppError::Conflict(DUPLICATE_FOLDER_MESSAGE.to_string()));
            }
        }

        let Some(folder) = state
            .folders
            .iter_mut()
            .find(|f| f.id == folder_id && f.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(name) = &changes.name {
            folder.name = name.clone();
        }
        if let Some(description) = &changes.description {
            folder.description = description.clone();
        }
        folder.updated_at = Utc::now();

        Ok(Some(folder.clone()))
    }

    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.folders.len();
        state.folders.retain(|f| !(f.id == folder_id && f.user_id == user_id));
        if state.folders.len() == before {
            return Ok(false);
        }

        for image in state.images.iter_mut().filter(|i| i.folder_id == Some(folder_id)) {
            image.folder_id = None;
        }
        Ok(true)
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn list_images(&self, user_id: Uuid, scope: ImageScope, limit: i64, offset: i64) -> AppResult<Vec<Image>> {
        let state = self.state.lock().await;
        let owned = state.images.iter().filter(|i| {
            i.user_id == user_id && scope.folder_id().is_none_or(|folder| i.folder_id == Some(folder))
        });
        Ok(page(owned.cloned(), limit, offset))
    }

    async fn find_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<Option<Image>> {
        let state = self.state.lock().await;
        Ok(state
            .images
            .iter()
            .find(|i| i.id == image_id && i.user_id == user_id)
            .cloned())
    }

    async fn move_image(&self, user_id: Uuid, image_id: Uuid, folder_id: Option<Uuid>) -> AppResult<Option<Image>> {
        let mut state = self.state.lock().await;

        if let Some(folder_id) = folder_id {
            if !state.folders.iter().any(|f| f.id == folder_id && f.user_id == user_id) {
                return Ok(None);
            }
        }

        let Some(image) = state
            .images
            .iter_mut()
            .find(|i| i.id == image_id && i.user_id == user_id)
        else {
            return Ok(None);
        };
        image.folder_id = folder_id;
        Ok(Some(image.clone()))
    }

    async fn delete_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.images.len();
        state.images.retain(|i| !(i.id == image_id && i.user_id == user_id));
        Ok(state.images.len() < before)
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn charge_generation(
        &self,
        request: &NewGenerationRequest,
        description: &str,
    ) -> AppResult<(GenerationRequest, LedgerReceipt)> {
        let mut state = self.state.lock().await;

        let generation = GenerationRequest {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            prompt: request.prompt.clone(),
            product_image_url: request.product_image_url.clone(),
            model_image_url: request.model_image_url.clone(),
            generation_type: request.generation_type.as_str().to_string(),
            num_variations: request.num_variations,
            credits_charged: request.credits_charged,
            status: "pending".to_string(),
            created_at: Utc::now(),
        };

        let entry = LedgerEntry::new(
            request.user_id,
            request.credits_charged,
            CreditTransactionType::Usage,
            description,
        )
        .with_generation(generation.id);
        let receipt = state.apply_debit(&entry)?;

        state.generations.push(generation.clone());
        Ok((generation, receipt))
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    AuditLog, BalanceDiscrepancy, CompletionOutcome, CreditTransaction, Folder, FolderChanges,
    GenerationRequest, Image, ImageScope, LedgerEntry, LedgerReceipt, NewAuditLog, NewFolder, NewGenerationRequest,
    NewPayment, NewUser, Payment, PaymentCompletion, PaymentFailure, PaymentRefund,
    RefundOutcome, User,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Creates the user on first sight and grants `signup_bonus` through the ledger.
    /// Returns the stored user and whether it was created by this call.
    async fn ensure_user(&self, new_user: &NewUser, signup_bonus: i64) -> AppResult<(User, bool)>;
}

/// Balance changes. Every method that moves a balance also appends the matching
/// ledger row in the same unit of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> AppResult<i64>;

    async fn credit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt>;

    /// Fails with `InsufficientCredits` without touching anything when the balance is too low.
    async fn debit(&self, entry: &LedgerEntry) -> AppResult<LedgerReceipt>;

    async fn transactions(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<CreditTransaction>>;

    async fn count_transactions(&self, user_id: Uuid) -> AppResult<i64>;

    /// Users whose stored balance differs from the sum of their ledger rows.
    async fn find_discrepancies(&self) -> AppResult<Vec<BalanceDiscrepancy>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &NewPayment) -> AppResult<Payment>;

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Payment>>;

    async fn find_by_order_id_for_user(&self, razorpay_order_id: &str, user_id: Uuid) -> AppResult<Option<Payment>>;

    async fn find_by_gateway_payment_id(&self, razorpay_payment_id: &str) -> AppResult<Option<Payment>>;

    async fn find_by_id(&self, payment_id: Uuid) -> AppResult<Option<Payment>>;

    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Payment>>;

    async fn count_for_user(&self, user_id: Uuid) -> AppResult<i64>;

    /// Moves `created -> completed` and credits the owner atomically. Exactly one caller
    /// per payment ever receives `CompletionOutcome::Completed`.
    async fn complete_and_credit(&self, completion: &PaymentCompletion) -> AppResult<CompletionOutcome>;

    /// Moves `created -> failed`. Returns `None` when the payment had already left `created`.
    async fn mark_failed(&self, failure: &PaymentFailure) -> AppResult<Option<Payment>>;

    /// Moves `completed -> refunded` and deducts the purchased credits, never below zero.
    async fn refund_and_debit(&self, refund: &PaymentRefund) -> AppResult<RefundOutcome>;

    /// Orders still `created` that were opened before `older_than`, oldest first.
    async fn find_stale_created(&self, older_than: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: &NewAuditLog) -> AppResult<AuditLog>;

    async fn list_for_resource(&self, resource_type: &str, resource_id: &str) -> AppResult<Vec<AuditLog>>;
}

#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Folder>>;

    async fn find(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<Option<Folder>>;

    /// Fails with `Conflict` when the user already has a folder with this name.
    async fn create(&self, folder: &NewFolder) -> AppResult<Folder>;

    async fn update(&self, user_id: Uuid, folder_id: Uuid, changes: &FolderChanges) -> AppResult<Option<Folder>>;

    /// Removes the folder; its images stay and become unfiled.
    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> AppResult<bool>;
}

/// Rendered images. Every lookup is scoped to the owner, so another user's id reads as absent.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Newest first.
    async fn list_images(&self, user_id: Uuid, scope: ImageScope, limit: i64, offset: i64) -> AppResult<Vec<Image>>;

    async fn find_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<Option<Image>>;

    /// Files the image under `folder_id`, or unfiles it when `None`. The folder must
    /// belong to the same user; returns `None` when either does not.
    async fn move_image(&self, user_id: Uuid, image_id: Uuid, folder_id: Option<Uuid>) -> AppResult<Option<Image>>;

    async fn delete_image(&self, user_id: Uuid, image_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Debits the request's cost and records it as pending in one unit of work.
    async fn charge_generation(&self, request: &NewGenerationRequest, description: &str) -> AppResult<(GenerationRequest, LedgerReceipt)>;
}

pub mod audit_log;
pub mod auth_jwt_claims;
pub mod authenticated_user;
pub mod credit_transaction;
pub mod folder;
pub mod generation;
pub mod image;
pub mod payment;
pub mod user;

pub use audit_log::{AuditLog, NewAuditLog};
pub use authenticated_user::AuthenticatedUser;
pub use credit_transaction::{
    BalanceDiscrepancy, CreditTransaction, CreditTransactionType, LedgerEntry, LedgerReceipt,
};
pub use folder::{Folder, FolderChanges, NewFolder};
pub use generation::{GenerationRequest, GenerationType, NewGenerationRequest};
pub use image::{Image, ImageScope, NewImage};
pub use payment::{
    CompletionOutcome, NewPayment, Payment, PaymentCompletion, PaymentFailure, PaymentRefund,
    PaymentStatus, RefundOutcome,
};
pub use user::{NewUser, User};

pub mod audit_log_repository;
pub mod credit_transaction_repository;
pub mod folder_repository;
pub mod generation_repository;
pub mod image_repository;
pub mod payment_repository;
pub mod user_repository;

pub use audit_log_repository::AuditLogRepository;
pub use credit_transaction_repository::CreditTransactionRepository;
pub use folder_repository::FolderRepository;
pub use generation_repository::GenerationRepository;
pub use image_repository::ImageRepository;
pub use payment_repository::PaymentRepository;
pub use user_repository::UserRepository;

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

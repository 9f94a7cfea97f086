use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppSettings;
use crate::db::repositories::{
    AuditLogRepository, CreditTransactionRepository, FolderRepository, GenerationRepository,
    ImageRepository, PaymentRepository, UserRepository,
};
use crate::db::stores::{
    AuditStore, FolderStore, GenerationStore, ImageStore, LedgerStore, PaymentStore, UserStore,
};
use crate::db::MemoryStore;
use crate::middleware::{RateLimitStorage, SecureAuthentication};
use crate::services::auth::JwtKeys;
use crate::services::{
    AuditService, CreditService, FolderService, ImageService, MaintenanceService, PaymentService,
    RazorpayService,
};

/// Storage handles behind every service
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub audit: Arc<dyn AuditStore>,
    pub folders: Arc<dyn FolderStore>,
    pub generations: Arc<dyn GenerationStore>,
    pub images: Arc<dyn ImageStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            ledger: Arc::new(CreditTransactionRepository::new(pool.clone())),
            payments: Arc::new(PaymentRepository::new(pool.clone())),
            audit: Arc::new(AuditLogRepository::new(pool.clone())),
            folders: Arc::new(FolderRepository::new(pool.clone())),
            generations: Arc::new(GenerationRepository::new(pool.clone())),
            images: Arc::new(ImageRepository::new(pool)),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let shared = Arc::new(store);
        Self {
            users: shared.clone(),
            ledger: shared.clone(),
            payments: shared.clone(),
            audit: shared.clone(),
            folders: shared.clone(),
            generations: shared.clone(),
            images: shared,
        }
    }
}

/// Everything the HTTP layer and background tasks need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub payment_service: PaymentService,
    pub credit_service: CreditService,
    pub folder_service: FolderService,
    pub image_service: ImageService,
    pub audit_service: AuditService,
    pub maintenance_service: MaintenanceService,
    pub authentication: SecureAuthentication,
    pub rate_limit_storage: RateLimitStorage,
}

impl AppState {
    pub fn new(
        stores: Stores,
        settings: &AppSettings,
        gateway: RazorpayService,
        rate_limit_storage: RateLimitStorage,
    ) -> Self {
        let audit_service = AuditService::new(stores.audit.clone());

        let payment_service = PaymentService::new(
            stores.payments.clone(),
            stores.users.clone(),
            Arc::new(gateway),
            audit_service.clone(),
            settings.credits.clone(),
        );
        let credit_service = CreditService::new(
            stores.ledger.clone(),
            stores.generations.clone(),
            audit_service.clone(),
            settings.credits.clone(),
        );
        let folder_service = FolderService::new(stores.folders.clone(), audit_service.clone());
        let image_service =
            ImageService::new(stores.images.clone(), stores.folders.clone(), audit_service.clone());
        let maintenance_service = MaintenanceService::new(
            stores.payments.clone(),
            stores.ledger.clone(),
            audit_service.clone(),
            settings.maintenance.clone(),
        );
        let authentication = SecureAuthentication::new(
            JwtKeys::from_secret(&settings.auth.jwt_secret),
            stores.users.clone(),
            audit_service.clone(),
            settings.credits.default_credits,
        )
        .with_failure_limiter(rate_limit_storage.clone());

        Self {
            payment_service,
            credit_service,
            folder_service,
            image_service,
            audit_service,
            maintenance_service,
            authentication,
            rate_limit_storage,
        }
    }
}

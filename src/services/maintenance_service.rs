use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::config::settings::MaintenanceConfig;
use crate::db::stores::{LedgerStore, PaymentStore};
use crate::error::AppResult;
use crate::models::{BalanceDiscrepancy, PaymentFailure};
use crate::services::audit_service::{
    AuditAction, AuditContext, AuditEvent, AuditResource, AuditService, AuditStatus,
};

pub const EXPIRED_ORDER_MESSAGE: &str = "Order expired before payment completion";
const EXPIRY_BATCH_SIZE: i64 = 200;

/// Periodic upkeep: expires abandoned orders and checks every balance against its ledger.
#[derive(Clone)]
pub struct MaintenanceService {
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<dyn LedgerStore>,
    audit: AuditService,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<dyn LedgerStore>,
        audit: AuditService,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            payments,
            ledger,
            audit,
            config,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Maintenance task started (every {}s, orders expire after {} minutes)",
                self.config.interval_secs, self.config.payment_expiry_minutes
            );
            let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    pub async fn run_once(&self) {
        match self.expire_stale_orders().await {
            Ok(0) => {}
            Ok(expired) => info!("Expired {} abandoned payment orders", expired),
            Err(e) => warn!("Payment expiry sweep failed: {}", e),
        }

        if let Err(e) = self.check_ledger().await {
            warn!("Ledger reconciliation check failed: {}", e);
        }
    }

    /// Fails orders still `created` past the expiry window. Uses the same conditional
    /// transition as the webhook, so a completion racing the sweep always wins.
    pub async fn expire_stale_orders(&self) -> AppResult<usize> {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.config.payment_expiry_minutes);
        let stale = self.payments.find_stale_created(cutoff, EXPIRY_BATCH_SIZE).await?;

        let mut expired = 0;
        for payment in stale {
            let failure = PaymentFailure {
                payment_id: payment.id,
                razorpay_payment_id: None,
                error_message: EXPIRED_ORDER_MESSAGE.to_string(),
                metadata: json!({ "expired_by": "maintenance" }),
            };

            if let Some(failed) = self.payments.mark_failed(&failure).await? {
                expired += 1;
                self.audit
                    .log(
                        &AuditContext::new(failed.user_id),
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(failed.id)
                            .with_status(AuditStatus::Failure)
                            .with_metadata(json!({
                                "razorpay_order_id": failed.razorpay_order_id,
                                "error": EXPIRED_ORDER_MESSAGE,
                                "created_at": failed.created_at.to_rfc3339(),
                            })),
                    )
                    .await;
            }
        }

        Ok(expired)
    }

    /// Reports users whose stored balance disagrees with their ledger. Never corrects them.
    pub async fn check_ledger(&self) -> AppResult<Vec<BalanceDiscrepancy>> {
        let discrepancies = self.ledger.find_discrepancies().await?;
        for discrepancy in &discrepancies {
            error!(
                "Ledger mismatch for user {}: stored {} vs ledger {} across {} transactions (off by {})",
                discrepancy.user_id,
                discrepancy.stored_balance,
                discrepancy.ledger_balance,
                discrepancy.transaction_count,
                discrepancy.difference()
            );
        }
        Ok(discrepancies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::stores::{AuditStore, UserStore};
    use crate::models::{NewPayment, NewUser, PaymentStatus};
    use bigdecimal::BigDecimal;
    use uuid::Uuid;

    fn service(store: &MemoryStore) -> MaintenanceService {
        let shared = Arc::new(store.clone());
        MaintenanceService::new(
            shared.clone(),
            shared.clone(),
            AuditService::new(shared),
            MaintenanceConfig {
                payment_expiry_minutes: 60,
                interval_secs: 900,
            },
        )
    }

    #[tokio::test]
    async fn test_only_orders_past_expiry_are_failed() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .ensure_user(
                &NewUser {
                    id: user_id,
                    email: "late@example.com".to_string(),
                    full_name: None,
                    avatar_url: None,
                },
                0,
            )
            .await
            .unwrap();

        let mut ids = Vec::new();
        for order in ["order_old", "order_new"] {
            let payment = store
                .insert_payment(&NewPayment {
                    user_id,
                    razorpay_order_id: order.to_string(),
                    amount_usd: BigDecimal::from(5),
                    amount_inr: BigDecimal::from(415),
                    credits_purchased: 500,
                    payment_stage: "sandbox".to_string(),
                    metadata: json!({}),
                })
                .await
                .unwrap();
            ids.push(payment.id);
        }
        store
            .backdate_payment(ids[0], Utc::now() - ChronoDuration::hours(2))
            .await
            .unwrap();

        let maintenance = service(&store);
        assert_eq!(maintenance.expire_stale_orders().await.unwrap(), 1);
        assert_eq!(maintenance.expire_stale_orders().await.unwrap(), 0);

        let old = store.find_by_id(ids[0]).await.unwrap().unwrap();
        assert_eq!(old.status, PaymentStatus::Failed.as_str());
        assert_eq!(old.error_message.as_deref(), Some(EXPIRED_ORDER_MESSAGE));
        let fresh = store.find_by_id(ids[1]).await.unwrap().unwrap();
        assert_eq!(fresh.status, PaymentStatus::Created.as_str());

        let trail = store.list_for_resource("payment", &ids[0].to_string()).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "payment.failed");
    }

    #[tokio::test]
    async fn test_check_ledger_reports_drift() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .ensure_user(
                &NewUser {
                    id: user_id,
                    email: "drift@example.com".to_string(),
                    full_name: None,
                    avatar_url: None,
                },
                100,
            )
            .await
            .unwrap();

        let maintenance = service(&store);
        assert!(maintenance.check_ledger().await.unwrap().is_empty());

        store.force_balance(user_id, 40).await.unwrap();
        let drift = maintenance.check_ledger().await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].difference(), -60);
    }
}

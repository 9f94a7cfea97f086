use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::settings::CreditsConfig;
use crate::db::stores::{PaymentStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthenticatedUser, CompletionOutcome, NewPayment, Payment, PaymentCompletion, PaymentFailure,
    PaymentRefund, RefundOutcome, User,
};
use crate::services::audit_service::{
    AuditAction, AuditContext, AuditEvent, AuditResource, AuditService, AuditStatus,
};
use crate::services::razorpay_service::{CreatedOrder, RazorpayService};
use crate::utils::financial_validation::{format_usd, paise_to_rupees};
use crate::utils::validation::{CreatePaymentInput, VerifyPaymentInput};

pub const INVALID_SIGNATURE_MESSAGE: &str = "Payment verification failed. Invalid signature.";
pub const PAYMENT_NOT_FOUND_MESSAGE: &str = "Payment record not found";
const CREDIT_FAILURE_MESSAGE: &str = "Failed to add credits";
const DEFAULT_FAILURE_DESCRIPTION: &str = "Payment failed";

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// A gateway order together with the local payment row that tracks it.
#[derive(Debug, Clone)]
pub struct OrderCreated {
    pub order: CreatedOrder,
    pub payment: Payment,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub payment_id: Uuid,
    pub credits_added: i64,
    /// Balance after this call applied the credit; absent for replays.
    pub total_credits: Option<i64>,
    pub already_processed: bool,
}

/// Acknowledgement for the gateway. Every signed delivery gets one, even when
/// processing failed, so the gateway does not retry into the same failure.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    pub refund: Option<EntityWrapper<RefundEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundEntity {
    pub id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Order creation, checkout verification and webhook processing. Both completion
/// paths funnel into `PaymentStore::complete_and_credit`, so whichever arrives
/// first applies the credit and the other observes an already-completed payment.
#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    users: Arc<dyn UserStore>,
    gateway: Arc<RazorpayService>,
    audit: AuditService,
    pricing: CreditsConfig,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        users: Arc<dyn UserStore>,
        gateway: Arc<RazorpayService>,
        audit: AuditService,
        pricing: CreditsConfig,
    ) -> Self {
        Self {
            payments,
            users,
            gateway,
            audit,
            pricing,
        }
    }

    pub fn gateway(&self) -> &RazorpayService {
        &self.gateway
    }

    pub fn pricing(&self) -> &CreditsConfig {
        &self.pricing
    }

    pub async fn create_order(
        &self,
        user: &AuthenticatedUser,
        input: CreatePaymentInput,
        context: &AuditContext,
    ) -> AppResult<OrderCreated> {
        let profile = self
            .users
            .find_user(user.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

        let order = match self
            .gateway
            .create_order(&input.amount_usd, profile.id, &profile.email, &self.pricing)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!("Failed to create Razorpay order for user {}: {}", profile.id, e);
                self.audit
                    .log(
                        context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_metadata(json!({ "amount_usd": format_usd(&input.amount_usd) }))
                            .with_error("Failed to create Razorpay order"),
                    )
                    .await;
                return Err(e.into());
            }
        };

        let new_payment = NewPayment {
            user_id: profile.id,
            razorpay_order_id: order.order_id.clone(),
            amount_usd: input.amount_usd.clone(),
            amount_inr: paise_to_rupees(order.amount_inr_paise),
            credits_purchased: order.credits,
            payment_stage: order.payment_stage.to_string(),
            metadata: json!({
                "user_email": profile.email,
                "user_name": profile.full_name,
            }),
        };

        let payment = match self.payments.insert_payment(&new_payment).await {
            Ok(payment) => payment,
            Err(e) => {
                // The remote order exists but has no local row; the gateway lets it lapse unpaid.
                error!("Failed to record payment for order {}: {}", order.order_id, e);
                self.audit
                    .log(
                        context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(&order.order_id)
                            .with_error("Failed to save payment record"),
                    )
                    .await;
                return Err(e);
            }
        };

        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::PaymentOrderCreated, AuditResource::Payment)
                    .with_resource_id(payment.id)
                    .with_metadata(json!({
                        "razorpay_order_id": order.order_id,
                        "amount_usd": format_usd(&order.amount_usd),
                        "credits": order.credits,
                        "payment_stage": order.payment_stage.as_str(),
                    })),
            )
            .await;

        Ok(OrderCreated {
            order,
            payment,
            user: profile,
        })
    }

    pub async fn verify_payment(
        &self,
        user: &AuthenticatedUser,
        input: VerifyPaymentInput,
        context: &AuditContext,
    ) -> AppResult<VerificationResult> {
        if !self.gateway.verify_payment_signature(
            &input.razorpay_order_id,
            &input.razorpay_payment_id,
            &input.razorpay_signature,
        ) {
            warn!(
                "Invalid payment signature from user {} for order {}",
                user.user_id, input.razorpay_order_id
            );
            self.audit
                .log(
                    context,
                    AuditEvent::new(AuditAction::SecurityInvalidSignature, AuditResource::Security)
                        .with_status(AuditStatus::Failure)
                        .with_metadata(json!({
                            "reason": "Invalid payment signature",
                            "razorpay_order_id": input.razorpay_order_id,
                            "razorpay_payment_id": input.razorpay_payment_id,
                        })),
                )
                .await;
            return Err(AppError::Signature(INVALID_SIGNATURE_MESSAGE.to_string()));
        }

        let payment = self
            .payments
            .find_by_order_id_for_user(&input.razorpay_order_id, user.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(PAYMENT_NOT_FOUND_MESSAGE.to_string()))?;

        if payment.is_completed() {
            debug!("Payment {} already completed, replaying result", payment.id);
            return Ok(Self::replayed(&payment));
        }

        let payment_method = match self.gateway.fetch_payment_details(&input.razorpay_payment_id).await {
            Ok(details) => details.method,
            Err(e) => {
                warn!(
                    "Could not fetch details for payment {}: {}; continuing with verified signature",
                    input.razorpay_payment_id, e
                );
                None
            }
        };

        let completion = PaymentCompletion {
            payment_id: payment.id,
            razorpay_payment_id: input.razorpay_payment_id.clone(),
            razorpay_signature: Some(input.razorpay_signature.clone()),
            payment_method,
            metadata: json!({ "processed_via": "verification" }),
            description: purchase_description(&payment),
        };

        match self.payments.complete_and_credit(&completion).await {
            Ok(CompletionOutcome::Completed { payment, new_balance }) => {
                info!(
                    "Payment {} verified: {} credits added to user {} (balance {})",
                    payment.id, payment.credits_purchased, payment.user_id, new_balance
                );
                self.audit_completion(context, &payment, "verification", AuditAction::PaymentVerified)
                    .await;

                Ok(VerificationResult {
                    payment_id: payment.id,
                    credits_added: payment.credits_purchased,
                    total_credits: Some(new_balance),
                    already_processed: false,
                })
            }
            Ok(CompletionOutcome::AlreadyCompleted(payment)) => {
                info!("Payment {} was completed concurrently", payment.id);
                Ok(Self::replayed(&payment))
            }
            Ok(CompletionOutcome::NotCompletable(payment)) => {
                error!(
                    "Verified payment {} is in status {} and cannot be credited",
                    payment.id, payment.status
                );
                self.audit
                    .log(
                        context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(payment.id)
                            .with_metadata(json!({
                                "razorpay_order_id": payment.razorpay_order_id,
                                "razorpay_payment_id": input.razorpay_payment_id,
                                "status": payment.status,
                            }))
                            .with_error("Verified payment is no longer open"),
                    )
                    .await;
                Err(AppError::LedgerConsistency(format!(
                    "payment {} verified while {}",
                    payment.id, payment.status
                )))
            }
            Err(e) => {
                error!("Failed to complete payment {}: {}", payment.id, e);
                let failure = PaymentFailure {
                    payment_id: payment.id,
                    razorpay_payment_id: Some(input.razorpay_payment_id.clone()),
                    error_message: CREDIT_FAILURE_MESSAGE.to_string(),
                    metadata: json!({ "processed_via": "verification" }),
                };
                if let Err(mark_error) = self.payments.mark_failed(&failure).await {
                    error!("Failed to mark payment {} as failed: {}", payment.id, mark_error);
                }
                self.audit
                    .log(
                        context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(payment.id)
                            .with_metadata(json!({
                                "razorpay_order_id": payment.razorpay_order_id,
                                "razorpay_payment_id": input.razorpay_payment_id,
                            }))
                            .with_error(CREDIT_FAILURE_MESSAGE),
                    )
                    .await;
                Err(AppError::LedgerConsistency(e.to_string()))
            }
        }
    }

    /// Verifies and processes a gateway webhook. Only signature problems are
    /// returned as errors; processing failures are logged and acknowledged.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        context: &AuditContext,
    ) -> AppResult<WebhookAck> {
        let reason = match signature {
            None => Some("Missing webhook signature"),
            Some(signature) if !self.gateway.verify_webhook_signature(raw_body, signature) => {
                Some("Invalid webhook signature")
            }
            Some(_) => None,
        };

        if let Some(reason) = reason {
            warn!("Rejected webhook: {}", reason);
            self.audit
                .log(
                    context,
                    AuditEvent::new(AuditAction::SecurityInvalidSignature, AuditResource::Security)
                        .with_status(AuditStatus::Failure)
                        .with_metadata(json!({ "reason": reason })),
                )
                .await;
            let message = if signature.is_none() { "Missing signature" } else { "Invalid signature" };
            return Err(AppError::Unauthorized(message.to_string()));
        }

        match self.process_webhook(raw_body, context).await {
            Ok(()) => Ok(WebhookAck {
                received: true,
                error: None,
            }),
            Err(e) => {
                error!("Webhook processing failed: {}", e);
                self.audit_webhook_problem(
                    context,
                    None,
                    json!({ "detail": e.to_string() }),
                    "Webhook processing failed",
                )
                .await;
                Ok(WebhookAck {
                    received: true,
                    error: Some("Internal error logged".to_string()),
                })
            }
        }
    }

    async fn process_webhook(&self, raw_body: &[u8], context: &AuditContext) -> AppResult<()> {
        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

        info!("Webhook received: {}", envelope.event);

        let payment_entity = envelope.payload.payment.map(|wrapper| wrapper.entity);
        let refund_entity = envelope.payload.refund.map(|wrapper| wrapper.entity);

        match envelope.event.as_str() {
            "payment.captured" => match payment_entity {
                Some(entity) => self.handle_payment_captured(entity, context).await,
                None => {
                    self.audit_missing_entity(context, &envelope.event).await;
                    Ok(())
                }
            },
            "payment.failed" => match payment_entity {
                Some(entity) => self.handle_payment_failed(entity, context).await,
                None => {
                    self.audit_missing_entity(context, &envelope.event).await;
                    Ok(())
                }
            },
            "payment.authorized" => {
                // Capture follows; nothing to do until then.
                info!(
                    "Payment authorized: {}",
                    payment_entity.map(|e| e.id).unwrap_or_default()
                );
                Ok(())
            }
            "refund.created" => match refund_entity {
                Some(entity) => self.handle_refund_created(entity, context).await,
                None => {
                    self.audit_missing_entity(context, &envelope.event).await;
                    Ok(())
                }
            },
            other => {
                info!("Unhandled webhook event: {}", other);
                Ok(())
            }
        }
    }

    async fn handle_payment_captured(&self, entity: PaymentEntity, context: &AuditContext) -> AppResult<()> {
        let Some(order_id) = entity.order_id.clone() else {
            warn!("Captured payment {} carries no order id", entity.id);
            self.audit_webhook_problem(
                context,
                Some(entity.id.as_str()),
                json!({ "event": "payment.captured", "razorpay_payment_id": entity.id }),
                "Webhook payment carries no order id",
            )
            .await;
            return Ok(());
        };

        let Some(payment) = self.payments.find_by_order_id(&order_id).await? else {
            error!("Webhook: payment record not found for order {}", order_id);
            self.audit_webhook_problem(
                context,
                Some(order_id.as_str()),
                json!({
                    "event": "payment.captured",
                    "razorpay_order_id": order_id,
                    "razorpay_payment_id": entity.id,
                }),
                PAYMENT_NOT_FOUND_MESSAGE,
            )
            .await;
            return Ok(());
        };

        if payment.is_completed() {
            info!("Webhook: payment for order {} already processed", order_id);
            return Ok(());
        }

        let context = context.clone().with_user_id(payment.user_id);
        let completion = PaymentCompletion {
            payment_id: payment.id,
            razorpay_payment_id: entity.id.clone(),
            razorpay_signature: None,
            payment_method: entity.method.clone(),
            metadata: json!({
                "processed_via": "webhook",
                "webhook_processed": true,
                "razorpay_payment_entity": entity,
            }),
            description: purchase_description(&payment),
        };

        match self.payments.complete_and_credit(&completion).await {
            Ok(CompletionOutcome::Completed { payment, new_balance }) => {
                info!(
                    "Webhook: payment {} completed, {} credits added to user {} (balance {})",
                    payment.id, payment.credits_purchased, payment.user_id, new_balance
                );
                self.audit_completion(&context, &payment, "webhook", AuditAction::PaymentCompleted)
                    .await;
                Ok(())
            }
            Ok(CompletionOutcome::AlreadyCompleted(payment)) => {
                info!("Webhook: payment {} already processed via verification", payment.id);
                Ok(())
            }
            Ok(CompletionOutcome::NotCompletable(payment)) => {
                error!(
                    "Webhook: captured payment {} for order {} is {}; needs manual reconciliation",
                    entity.id, order_id, payment.status
                );
                self.audit
                    .log(
                        &context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(payment.id)
                            .with_metadata(json!({
                                "razorpay_order_id": order_id,
                                "razorpay_payment_id": entity.id,
                                "status": payment.status,
                            }))
                            .with_error("Captured payment for an order that is no longer open"),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.audit
                    .log(
                        &context,
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(payment.id)
                            .with_metadata(json!({
                                "razorpay_order_id": order_id,
                                "razorpay_payment_id": entity.id,
                            }))
                            .with_error("Webhook failed to add credits"),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn handle_payment_failed(&self, entity: PaymentEntity, context: &AuditContext) -> AppResult<()> {
        let Some(order_id) = entity.order_id.clone() else {
            warn!("Failed payment {} carries no order id", entity.id);
            self.audit_webhook_problem(
                context,
                Some(entity.id.as_str()),
                json!({ "event": "payment.failed", "razorpay_payment_id": entity.id }),
                "Webhook payment carries no order id",
            )
            .await;
            return Ok(());
        };

        let Some(payment) = self.payments.find_by_order_id(&order_id).await? else {
            error!("Webhook: payment record not found for failed payment on order {}", order_id);
            self.audit_webhook_problem(
                context,
                Some(order_id.as_str()),
                json!({
                    "event": "payment.failed",
                    "razorpay_order_id": order_id,
                    "razorpay_payment_id": entity.id,
                }),
                PAYMENT_NOT_FOUND_MESSAGE,
            )
            .await;
            return Ok(());
        };

        if payment.is_completed() {
            info!("Webhook: ignoring failure event for completed order {}", order_id);
            return Ok(());
        }

        let error_description = entity
            .error_description
            .clone()
            .unwrap_or_else(|| DEFAULT_FAILURE_DESCRIPTION.to_string());

        let failure = PaymentFailure {
            payment_id: payment.id,
            razorpay_payment_id: Some(entity.id.clone()),
            error_message: error_description.clone(),
            metadata: json!({
                "failure_reason": entity.error_reason,
                "error_code": entity.error_code,
            }),
        };

        match self.payments.mark_failed(&failure).await? {
            Some(failed) => {
                info!("Webhook: payment for order {} failed: {}", order_id, error_description);
                self.audit
                    .log(
                        &context.clone().with_user_id(failed.user_id),
                        AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
                            .with_resource_id(failed.id)
                            .with_status(AuditStatus::Failure)
                            .with_metadata(json!({
                                "razorpay_order_id": order_id,
                                "razorpay_payment_id": entity.id,
                                "error": error_description,
                                "error_code": entity.error_code,
                            })),
                    )
                    .await;
            }
            None => info!("Webhook: order {} left the created state before the failure event", order_id),
        }

        Ok(())
    }

    async fn handle_refund_created(&self, entity: RefundEntity, context: &AuditContext) -> AppResult<()> {
        let Some(gateway_payment_id) = entity.payment_id.clone() else {
            warn!("Refund {} carries no payment id", entity.id);
            self.audit_webhook_problem(
                context,
                Some(entity.id.as_str()),
                json!({ "event": "refund.created", "refund_id": entity.id }),
                "Webhook refund carries no payment id",
            )
            .await;
            return Ok(());
        };

        let Some(payment) = self.payments.find_by_gateway_payment_id(&gateway_payment_id).await? else {
            error!("Webhook: payment not found for refund {} of {}", entity.id, gateway_payment_id);
            self.audit_webhook_problem(
                context,
                Some(gateway_payment_id.as_str()),
                json!({
                    "event": "refund.created",
                    "refund_id": entity.id,
                    "razorpay_payment_id": gateway_payment_id,
                }),
                PAYMENT_NOT_FOUND_MESSAGE,
            )
            .await;
            return Ok(());
        };

        let refund = PaymentRefund {
            payment_id: payment.id,
            metadata: json!({
                "refund_id": entity.id,
                "refund_amount": entity.amount,
                "refund_status": entity.status,
            }),
            description: format!("Refund for payment {}", gateway_payment_id),
        };

        match self.payments.refund_and_debit(&refund).await? {
            RefundOutcome::Refunded {
                payment,
                credits_deducted,
                new_balance,
            } => {
                if credits_deducted < payment.credits_purchased {
                    warn!(
                        "Refund {} clawed back {} of {} credits from user {}; the rest was already spent",
                        entity.id, credits_deducted, payment.credits_purchased, payment.user_id
                    );
                }
                info!(
                    "Webhook: refund {} processed for payment {} (balance {})",
                    entity.id, payment.id, new_balance
                );

                let context = context.clone().with_user_id(payment.user_id);
                self.audit
                    .log(
                        &context,
                        AuditEvent::new(AuditAction::PaymentRefunded, AuditResource::Payment)
                            .with_resource_id(payment.id)
                            .with_metadata(json!({
                                "refund_id": entity.id,
                                "refund_amount": entity.amount,
                                "credits_deducted": credits_deducted,
                            })),
                    )
                    .await;
                if credits_deducted > 0 {
                    self.audit
                        .log(
                            &context,
                            AuditEvent::new(AuditAction::CreditsRefunded, AuditResource::Credit)
                                .with_resource_id(payment.user_id)
                                .with_metadata(json!({
                                    "payment_id": payment.id,
                                    "credits_deducted": credits_deducted,
                                    "balance": new_balance,
                                })),
                        )
                        .await;
                }
            }
            RefundOutcome::NotRefundable(payment) => {
                info!(
                    "Webhook: ignoring refund {} for payment {} in status {}",
                    entity.id, payment.id, payment.status
                );
            }
        }

        Ok(())
    }

    pub async fn payment_history(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Payment>, i64)> {
        let payments = self.payments.list_for_user(user_id, limit, offset).await?;
        let total = self.payments.count_for_user(user_id).await?;
        Ok((payments, total))
    }

    async fn audit_completion(&self, context: &AuditContext, payment: &Payment, via: &str, action: AuditAction) {
        self.audit
            .log(
                context,
                AuditEvent::new(action, AuditResource::Payment)
                    .with_resource_id(payment.id)
                    .with_metadata(json!({
                        "razorpay_order_id": payment.razorpay_order_id,
                        "razorpay_payment_id": payment.razorpay_payment_id,
                        "amount_usd": format_usd(&payment.amount_usd),
                        "credits": payment.credits_purchased,
                        "processed_via": via,
                    })),
            )
            .await;
        self.audit
            .log(
                context,
                AuditEvent::new(AuditAction::CreditsPurchased, AuditResource::Credit)
                    .with_resource_id(payment.user_id)
                    .with_metadata(json!({
                        "payment_id": payment.id,
                        "credits": payment.credits_purchased,
                    })),
            )
            .await;
    }

    /// Acknowledged webhooks that could not be applied still leave an error-status
    /// entry for operators to follow up on.
    async fn audit_webhook_problem(
        &self,
        context: &AuditContext,
        reference: Option<&str>,
        metadata: serde_json::Value,
        message: &str,
    ) {
        let mut event = AuditEvent::new(AuditAction::PaymentFailed, AuditResource::Payment)
            .with_metadata(metadata)
            .with_error(message);
        if let Some(reference) = reference {
            event = event.with_resource_id(reference);
        }
        self.audit.log(context, event).await;
    }

    async fn audit_missing_entity(&self, context: &AuditContext, event: &str) {
        warn!("Webhook {} arrived without an entity", event);
        self.audit_webhook_problem(context, None, json!({ "event": event }), "Webhook event carries no entity")
            .await;
    }

    fn replayed(payment: &Payment) -> VerificationResult {
        VerificationResult {
            payment_id: payment.id,
            credits_added: payment.credits_purchased,
            total_credits: None,
            already_processed: true,
        }
    }
}

fn purchase_description(payment: &Payment) -> String {
    format!("Credit purchase - ${}", format_usd(&payment.amount_usd))
}

/// Clamps client-supplied pagination to sane bounds.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>, default_limit: i64, max_limit: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(default_limit).clamp(1, max_limit);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None, 20, 100), (20, 0));
        assert_eq!(page_bounds(Some(500), Some(-3), 20, 100), (100, 0));
        assert_eq!(page_bounds(Some(0), Some(40), 20, 100), (1, 40));
    }

    #[test]
    fn test_webhook_envelope_tolerates_missing_entities() {
        let envelope: WebhookEnvelope =
            serde_json::from_str(r#"{"event":"payment.authorized","payload":{}}"#).unwrap();
        assert!(envelope.payload.payment.is_none());

        let envelope: WebhookEnvelope = serde_json::from_str(r#"{"event":"order.paid"}"#).unwrap();
        assert_eq!(envelope.event, "order.paid");
    }

    #[test]
    fn test_failed_ack_serializes_error() {
        let ack = WebhookAck {
            received: true,
            error: Some("Internal error logged".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({ "received": true, "error": "Internal error logged" })
        );
        let ok = WebhookAck {
            received: true,
            error: None,
        };
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "received": true }));
    }
}

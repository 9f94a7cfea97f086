#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::{App, test};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imagegen_server::Stores;
use imagegen_server::db::MemoryStore;
use imagegen_server::db::stores::{LedgerStore, PaymentStore};
use imagegen_server::error::{AppError, AppResult, CONTACT_SUPPORT_MESSAGE};
use imagegen_server::models::{
    CompletionOutcome, NewPayment, Payment, PaymentCompletion, PaymentFailure, PaymentRefund, RefundOutcome,
};
use imagegen_server::routes::configure_app;
use imagegen_server::services::audit_service::AuditResource;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use common::{bearer, captured_event, checkout_signature, seed_order, state_over, test_state, webhook_signature};

/// Memory-backed payments whose completion step always fails, as when the ledger write errors.
struct BrokenLedgerPayments(MemoryStore);

#[async_trait]
impl PaymentStore for BrokenLedgerPayments {
    async fn insert_payment(&self, payment: &NewPayment) -> AppResult<Payment> {
        self.0.insert_payment(payment).await
    }

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> AppResult<Option<Payment>> {
        self.0.find_by_order_id(razorpay_order_id).await
    }

    async fn find_by_order_id_for_user(&self, razorpay_order_id: &str, user_id: Uuid) -> AppResult<Option<Payment>> {
        self.0.find_by_order_id_for_user(razorpay_order_id, user_id).await
    }

    async fn find_by_gateway_payment_id(&self, razorpay_payment_id: &str) -> AppResult<Option<Payment>> {
        self.0.find_by_gateway_payment_id(razorpay_payment_id).await
    }

    async fn find_by_id(&self, payment_id: Uuid) -> AppResult<Option<Payment>> {
        self.0.find_by_id(payment_id).await
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Payment>> {
        self.0.list_for_user(user_id, limit, offset).await
    }

    async fn count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        self.0.count_for_user(user_id).await
    }

    async fn complete_and_credit(&self, _completion: &PaymentCompletion) -> AppResult<CompletionOutcome> {
        Err(AppError::Database("could not serialize access".to_string()))
    }

    async fn mark_failed(&self, failure: &PaymentFailure) -> AppResult<Option<Payment>> {
        self.0.mark_failed(failure).await
    }

    async fn refund_and_debit(&self, refund: &PaymentRefund) -> AppResult<RefundOutcome> {
        self.0.refund_and_debit(refund).await
    }

    async fn find_stale_created(&self, older_than: DateTime<Utc>, limit: i64) -> AppResult<Vec<Payment>> {
        self.0.find_stale_created(older_than, limit).await
    }
}

fn verify_request(auth: &str, order_id: &str, payment_id: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/payments/verify")
        .insert_header(("Authorization", auth.to_string()))
        .set_json(json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": checkout_signature(order_id, payment_id),
        }))
}

fn signed_webhook(body: String) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/payments/webhook")
        .insert_header(("x-razorpay-signature", webhook_signature(&body)))
        .set_payload(body)
}

#[actix_rt::test]
async fn gateway_order_failure_leaves_no_payment_row() {
    let mut gateway = mockito::Server::new_async().await;
    let order_mock = gateway
        .mock("POST", "/orders")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"code":"SERVER_ERROR","description":"The server encountered an error"}}"#)
        .create_async()
        .await;

    let (state, store) = test_state(&gateway.url());
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;
    let user_id = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/payments/create-order")
        .insert_header(("Authorization", bearer(user_id, "unlucky@example.com")))
        .set_json(json!({ "amountUsd": 10 }))
        .to_request();
    let (status, _, body) = send!(app, req);
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errorType"], "gateway_error");
    order_mock.assert_async().await;

    assert_eq!(store.count_for_user(user_id).await.unwrap(), 0);
    assert_eq!(store.balance(user_id).await.unwrap(), 100);

    let failures: Vec<_> = store
        .audit_entries()
        .await
        .into_iter()
        .filter(|entry| entry.action == "payment.failed")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status, "error");
    assert_eq!(failures[0].user_id, Some(user_id));
    assert_eq!(failures[0].metadata["error"], "Failed to create Razorpay order");
}

#[actix_rt::test]
async fn verify_of_failed_payment_asks_for_support_without_crediting() {
    let gateway = mockito::Server::new_async().await;
    let (state, store) = test_state(&gateway.url());
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

    let user_id = Uuid::new_v4();
    common::seed_user(&store, user_id, 0).await;
    let payment = seed_order(&store, user_id, "order_LAPSED", 400).await;
    store
        .mark_failed(&PaymentFailure {
            payment_id: payment.id,
            razorpay_payment_id: None,
            error_message: "Order expired before payment completion".to_string(),
            metadata: json!({}),
        })
        .await
        .unwrap();

    let auth = bearer(user_id, "late@example.com");
    let (status, _, body) = send!(app, verify_request(&auth, "order_LAPSED", "pay_LAPSED").to_request());
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], CONTACT_SUPPORT_MESSAGE);

    assert_eq!(store.balance(user_id).await.unwrap(), 0);
    let stored = store.find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");

    let trail = state
        .audit_service
        .history_for(AuditResource::Payment, &payment.id.to_string())
        .await
        .unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "payment.failed");
    assert_eq!(trail[0].status, "error");
    assert_eq!(trail[0].metadata["status"], "failed");
}

#[actix_rt::test]
async fn ledger_failure_during_verify_marks_payment_failed() {
    let gateway = mockito::Server::new_async().await;
    let store = MemoryStore::new();
    let mut stores = Stores::memory(store.clone());
    stores.payments = Arc::new(BrokenLedgerPayments(store.clone()));
    let state = state_over(stores, &gateway.url());
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

    let user_id = Uuid::new_v4();
    common::seed_user(&store, user_id, 0).await;
    let payment = seed_order(&store, user_id, "order_BROKEN", 500).await;

    let auth = bearer(user_id, "broken@example.com");
    let (status, _, body) = send!(app, verify_request(&auth, "order_BROKEN", "pay_BROKEN").to_request());
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], CONTACT_SUPPORT_MESSAGE);

    assert_eq!(store.balance(user_id).await.unwrap(), 0);
    let stored = store.find_by_id(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.razorpay_payment_id.as_deref(), Some("pay_BROKEN"));
    assert_eq!(stored.error_message.as_deref(), Some("Failed to add credits"));

    let trail = state
        .audit_service
        .history_for(AuditResource::Payment, &payment.id.to_string())
        .await
        .unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].status, "error");
    assert_eq!(trail[0].metadata["error"], "Failed to add credits");
}

#[actix_rt::test]
async fn unprocessable_webhooks_are_acknowledged_and_audited() {
    let gateway = mockito::Server::new_async().await;
    let (state, store) = test_state(&gateway.url());
    let app = test::init_service(App::new().configure(|cfg| configure_app(cfg, &state))).await;

    let (status, _, ack) = send!(app, signed_webhook("not json at all".to_string()).to_request());
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "received": true, "error": "Internal error logged" }));

    let (status, _, ack) = send!(app, signed_webhook(captured_event("order_UNKNOWN", "pay_UNKNOWN")).to_request());
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "received": true }));

    let refund = json!({
        "event": "refund.created",
        "payload": { "refund": { "entity": {
            "id": "rfnd_UNKNOWN",
            "payment_id": "pay_UNKNOWN",
            "amount": 83000,
            "status": "processed"
        } } }
    });
    let (status, _, _) = send!(app, signed_webhook(refund.to_string()).to_request());
    assert_eq!(status, StatusCode::OK);

    let empty_failure = json!({ "event": "payment.failed", "payload": {} });
    let (status, _, _) = send!(app, signed_webhook(empty_failure.to_string()).to_request());
    assert_eq!(status, StatusCode::OK);

    let entries = store.audit_entries().await;
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.action == "payment.failed" && e.status == "error"));
    assert_eq!(entries[0].metadata["error"], "Webhook processing failed");
    assert_eq!(entries[1].resource_id.as_deref(), Some("order_UNKNOWN"));
    assert_eq!(entries[2].resource_id.as_deref(), Some("pay_UNKNOWN"));
    assert_eq!(entries[3].metadata["event"], "payment.failed");
}

#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::Duration;
use imagegen_server::config::settings::{
    AppSettings, AuthConfig, CreditsConfig, DatabaseConfig, MaintenanceConfig, RateLimitConfig,
    RazorpayConfig, ServerConfig,
};
use imagegen_server::config::PaymentStage;
use imagegen_server::db::stores::{PaymentStore, UserStore};
use imagegen_server::db::MemoryStore;
use imagegen_server::middleware::RateLimitStorage;
use imagegen_server::models::{NewPayment, NewUser, Payment};
use imagegen_server::services::auth::JwtKeys;
use imagegen_server::services::razorpay_service::sign_payload;
use imagegen_server::services::RazorpayService;
use imagegen_server::{AppState, Stores};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-jwt-secret";
pub const KEY_SECRET: &str = "integration-key-secret";
pub const WEBHOOK_SECRET: &str = "integration-webhook-secret";

pub fn settings(api_base: &str) -> AppSettings {
    AppSettings {
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_integration".to_string(),
            key_secret: KEY_SECRET.to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout_secs: 5,
            payment_stage: PaymentStage::Sandbox,
        },
        credits: CreditsConfig::default(),
        rate_limit: RateLimitConfig {
            redis_url: None,
            redis_key_prefix: "test".to_string(),
        },
        maintenance: MaintenanceConfig {
            payment_expiry_minutes: 60,
            interval_secs: 900,
        },
    }
}

/// Application state over a fresh in-memory store, with the gateway pointed at `api_base`.
pub fn test_state(api_base: &str) -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    (state_over(Stores::memory(store.clone()), api_base), store)
}

/// Application state over caller-supplied stores, e.g. with one store swapped for a failing stand-in.
pub fn state_over(stores: Stores, api_base: &str) -> AppState {
    let settings = settings(api_base);
    let gateway = RazorpayService::new(settings.razorpay.clone()).unwrap();
    AppState::new(stores, &settings, gateway, RateLimitStorage::new_memory())
}

pub fn bearer(user_id: Uuid, email: &str) -> String {
    let token = JwtKeys::from_secret(JWT_SECRET)
        .create_token(user_id, email, Some("Test Buyer"), Duration::hours(1))
        .unwrap();
    format!("Bearer {}", token)
}

pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    sign_payload(format!("{}|{}", order_id, payment_id).as_bytes(), KEY_SECRET).unwrap()
}

pub fn webhook_signature(body: &str) -> String {
    sign_payload(body.as_bytes(), WEBHOOK_SECRET).unwrap()
}

pub async fn seed_user(store: &MemoryStore, user_id: Uuid, signup_bonus: i64) {
    store
        .ensure_user(
            &NewUser {
                id: user_id,
                email: format!("{}@example.com", user_id.simple()),
                full_name: None,
                avatar_url: None,
            },
            signup_bonus,
        )
        .await
        .unwrap();
}

pub async fn seed_order(store: &MemoryStore, user_id: Uuid, order_id: &str, credits: i64) -> Payment {
    store
        .insert_payment(&NewPayment {
            user_id,
            razorpay_order_id: order_id.to_string(),
            amount_usd: BigDecimal::from(credits) / BigDecimal::from(100),
            amount_inr: BigDecimal::from(credits * 83) / BigDecimal::from(100),
            credits_purchased: credits,
            payment_stage: "sandbox".to_string(),
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap()
}

pub fn captured_event(order_id: &str, payment_id: &str) -> String {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": "captured",
                    "method": "card",
                    "amount": 83000
                }
            }
        }
    })
    .to_string()
}

/// Sends a request and returns status, headers and JSON body, whether the
/// service answered or a middleware short-circuited with an error.
#[macro_export]
macro_rules! send {
    ($app:expr, $req:expr) => {{
        match actix_web::test::try_call_service(&$app, $req).await {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp.headers().clone();
                let body = actix_web::test::read_body(resp).await;
                let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                (status, headers, json)
            }
            Err(err) => {
                let resp = err.error_response();
                let status = resp.status();
                let headers = resp.headers().clone();
                let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
                let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                (status, headers, json)
            }
        }
    }};
}

use bigdecimal::BigDecimal;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::{PaymentStage, settings::{CreditsConfig, RazorpayConfig}};
use crate::utils::financial_validation::{
    calculate_credits, convert_usd_to_inr_paise, format_usd, validate_purchase_amount,
};
use crate::utils::http_client::new_gateway_client;

pub const SETTLEMENT_CURRENCY: &str = "INR";

#[derive(Debug, thiserror::Error)]
pub enum RazorpayServiceError {
    #[error("Razorpay API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Request to Razorpay failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

type HmacSha256 = Hmac<Sha256>;

/// Order notes echoed back by the gateway on every payment and webhook for the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderNotes {
    pub user_id: String,
    pub user_email: String,
    pub amount_usd: String,
    pub credits: String,
    pub payment_stage: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
    notes: OrderNotes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Result of a successful remote order creation
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order_id: String,
    pub amount_usd: BigDecimal,
    pub amount_inr_paise: i64,
    pub credits: i64,
    pub payment_stage: PaymentStage,
}

#[derive(Clone)]
pub struct RazorpayService {
    client: Client,
    config: RazorpayConfig,
}

impl RazorpayService {
    pub fn new(config: RazorpayConfig) -> Result<Self, RazorpayServiceError> {
        if config.key_id.trim().is_empty() || config.key_secret.trim().is_empty() {
            return Err(RazorpayServiceError::Configuration(
                "Missing Razorpay credentials. Please set RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET".to_string(),
            ));
        }

        let client = new_gateway_client(Duration::from_secs(config.timeout_secs))
            .map_err(|e| RazorpayServiceError::Configuration(e.to_string()))?;

        info!(
            "Razorpay client initialised for {} mode against {}",
            config.payment_stage, config.api_base
        );

        Ok(Self { client, config })
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub fn payment_stage(&self) -> PaymentStage {
        self.config.payment_stage
    }

    pub fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(order_id, payment_id, signature, &self.config.key_secret)
    }

    pub fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_webhook_signature(raw_body, signature, &self.config.webhook_secret)
    }

    /// Prices the purchase and opens a gateway order for it.
    pub async fn create_order(
        &self,
        amount_usd: &BigDecimal,
        user_id: Uuid,
        user_email: &str,
        pricing: &CreditsConfig,
    ) -> Result<CreatedOrder, RazorpayServiceError> {
        let invalid = |e: crate::error::AppError| RazorpayServiceError::InvalidAmount(e.user_message());

        validate_purchase_amount(amount_usd, pricing).map_err(invalid)?;
        let credits = calculate_credits(amount_usd, pricing.credits_per_dollar).map_err(invalid)?;
        let amount_inr_paise = convert_usd_to_inr_paise(amount_usd, &pricing.usd_to_inr_rate).map_err(invalid)?;

        let request = CreateOrderRequest {
            amount: amount_inr_paise,
            currency: SETTLEMENT_CURRENCY,
            receipt: receipt_for(user_id),
            notes: OrderNotes {
                user_id: user_id.to_string(),
                user_email: user_email.to_string(),
                amount_usd: format_usd(amount_usd),
                credits: credits.to_string(),
                payment_stage: self.config.payment_stage.to_string(),
            },
        };

        debug!("Creating Razorpay order for user {}: {} paise", user_id, amount_inr_paise);

        let response = self
            .client
            .post(format!("{}/orders", self.config.api_base))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await?;

        let order: RazorpayOrder = Self::parse_response(response).await?;

        info!(
            "Created Razorpay order {} for user {} ({} credits)",
            order.id, user_id, credits
        );

        Ok(CreatedOrder {
            order_id: order.id,
            amount_usd: amount_usd.clone(),
            amount_inr_paise,
            credits,
            payment_stage: self.config.payment_stage,
        })
    }

    pub async fn fetch_payment_details(&self, payment_id: &str) -> Result<RazorpayPayment, RazorpayServiceError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.config.api_base, payment_id))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RazorpayServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => format!(
                "{}: {}",
                envelope.error.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                envelope.error.description.unwrap_or_default()
            ),
            Err(_) => body,
        };

        error!("Razorpay request failed with {}: {}", status, message);
        Err(RazorpayServiceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Gateway receipts are capped at 40 characters.
fn receipt_for(user_id: Uuid) -> String {
    let user = user_id.simple().to_string();
    format!("order_{}_{}", &user[..12], Utc::now().timestamp_millis())
}

/// Hex HMAC-SHA256 of `payload`, the format the gateway uses for both signature kinds.
pub fn sign_payload(payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn signature_matches(payload: &[u8], signature: &str, secret: &str) -> bool {
    match sign_payload(payload, secret) {
        Some(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
        None => false,
    }
}

/// Checks the checkout callback signature, HMAC over `order_id|payment_id`.
pub fn verify_payment_signature(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    signature_matches(payload.as_bytes(), signature, secret)
}

/// Checks a webhook signature. Must be given the body exactly as received.
pub fn verify_webhook_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        error!("Webhook secret not configured");
        return false;
    }
    signature_matches(raw_body, signature, secret)
}

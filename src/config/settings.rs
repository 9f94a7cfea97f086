use std::env;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub razorpay: RazorpayConfig,
    pub credits: CreditsConfig,
    pub rate_limit: RateLimitConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStage {
    Sandbox,
    Production,
}

impl PaymentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStage::Sandbox => "sandbox",
            PaymentStage::Production => "production",
        }
    }
}

impl fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(PaymentStage::Sandbox),
            "production" => Ok(PaymentStage::Production),
            other => Err(AppError::Configuration(format!(
                "PAYMENT_STAGE must be either \"sandbox\" or \"production\", got \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub payment_stage: PaymentStage,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditsConfig {
    pub credits_per_dollar: i64,
    pub min_purchase_usd: BigDecimal,
    pub max_purchase_usd: BigDecimal,
    pub usd_to_inr_rate: BigDecimal,
    pub default_credits: i64,
    pub credits_per_generation: i64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            credits_per_dollar: 100,
            min_purchase_usd: BigDecimal::from(1),
            max_purchase_usd: BigDecimal::from(9999),
            usd_to_inr_rate: BigDecimal::from(83),
            default_credits: 100,
            credits_per_generation: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub payment_expiry_minutes: i64,
    pub interval_secs: u64,
}

fn parse_var<T: FromStr>(name: &str, default: &str, expectation: &str) -> Result<T, AppError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::Configuration(format!("{} must be {}", name, expectation)))
}

fn required_var(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} must be set", name)))
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        // Database config
        let database_url = required_var("DATABASE_URL")?;

        // Server config
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = parse_var::<u16>("SERVER_PORT", "8080", "a valid port number")?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth config
        let jwt_secret = required_var("SUPABASE_JWT_SECRET")?;

        // Razorpay config
        let key_id = required_var("RAZORPAY_KEY_ID")?;
        let key_secret = required_var("RAZORPAY_KEY_SECRET")?;
        let webhook_secret = required_var("RAZORPAY_WEBHOOK_SECRET")?;
        let api_base = env::var("RAZORPAY_API_BASE")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = parse_var::<u64>("RAZORPAY_TIMEOUT_SECS", "30", "a whole number of seconds")?;
        let payment_stage = env::var("PAYMENT_STAGE")
            .unwrap_or_else(|_| "sandbox".to_string())
            .parse::<PaymentStage>()?;

        // Credit pricing
        let credits_per_dollar = parse_var::<i64>("CREDITS_PER_DOLLAR", "100", "a whole number")?;
        let min_purchase_usd = parse_var::<BigDecimal>("MIN_PURCHASE_USD", "1", "a decimal amount")?;
        let max_purchase_usd = parse_var::<BigDecimal>("MAX_PURCHASE_USD", "9999", "a decimal amount")?;
        let usd_to_inr_rate = parse_var::<BigDecimal>("USD_TO_INR_RATE", "83", "a decimal rate")?;
        let default_credits = parse_var::<i64>("DEFAULT_CREDITS", "100", "a whole number")?;
        let credits_per_generation = parse_var::<i64>("CREDITS_PER_GENERATION", "5", "a whole number")?;

        if credits_per_dollar <= 0 || credits_per_generation <= 0 || default_credits < 0 {
            return Err(AppError::Configuration(
                "Credit pricing values must be positive".to_string(),
            ));
        }
        if min_purchase_usd <= BigDecimal::from(0) || min_purchase_usd > max_purchase_usd {
            return Err(AppError::Configuration(
                "MIN_PURCHASE_USD must be positive and not exceed MAX_PURCHASE_USD".to_string(),
            ));
        }

        // Rate limiting
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty());
        let redis_key_prefix = env::var("RATE_LIMIT_REDIS_PREFIX").unwrap_or_else(|_| "imagegen".to_string());

        // Background maintenance
        let payment_expiry_minutes = parse_var::<i64>("PAYMENT_EXPIRY_MINUTES", "1440", "a whole number of minutes")?;
        let maintenance_interval_secs = parse_var::<u64>("MAINTENANCE_INTERVAL_SECS", "900", "a whole number of seconds")?;

        Ok(Self {
            database: DatabaseConfig {
                url: database_url,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig {
                jwt_secret,
            },
            razorpay: RazorpayConfig {
                key_id,
                key_secret,
                webhook_secret,
                api_base,
                timeout_secs,
                payment_stage,
            },
            credits: CreditsConfig {
                credits_per_dollar,
                min_purchase_usd,
                max_purchase_usd,
                usd_to_inr_rate,
                default_credits,
                credits_per_generation,
            },
            rate_limit: RateLimitConfig {
                redis_url,
                redis_key_prefix,
            },
            maintenance: MaintenanceConfig {
                payment_expiry_minutes,
                interval_secs: maintenance_interval_secs,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_stage_parsing() {
        assert_eq!("sandbox".parse::<PaymentStage>().unwrap(), PaymentStage::Sandbox);
        assert_eq!("production".parse::<PaymentStage>().unwrap(), PaymentStage::Production);
        assert!(matches!(
            "staging".parse::<PaymentStage>(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_credit_pricing() {
        let credits = CreditsConfig::default();
        assert_eq!(credits.credits_per_dollar, 100);
        assert_eq!(credits.min_purchase_usd, BigDecimal::from(1));
        assert_eq!(credits.max_purchase_usd, BigDecimal::from(9999));
        assert_eq!(credits.default_credits, 100);
        assert_eq!(credits.credits_per_generation, 5);
    }
}

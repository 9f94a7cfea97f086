use reqwest::Client;
use std::time::Duration;

use crate::error::AppError;

/// Client for payment gateway calls. A slow gateway delays the caller by at most `timeout`.
pub fn new_gateway_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .user_agent(concat!("imagegen-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

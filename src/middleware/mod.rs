pub mod rate_limiting;
pub mod secure_auth;

pub use rate_limiting::{RateLimitMiddleware, RateLimitRule, RateLimitStorage, create_rate_limit_storage};
pub use secure_auth::SecureAuthentication;

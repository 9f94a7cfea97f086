use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures_util::future::{Ready, ok};
use log::{debug, error, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::audit_service::{
    AuditAction, AuditContext, AuditEvent, AuditResource, AuditService, AuditStatus,
};
use crate::utils::request_info::client_ip;

/// Share of `check` calls that also sweep stale windows out of the in-memory map.
const SWEEP_PROBABILITY: f64 = 0.001;
/// Windows are kept this long past their reset before a sweep may drop them.
const SWEEP_GRACE_SECS: i64 = 60;

/// Fixed-window quota: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitRule {
    pub const AUTH: RateLimitRule = RateLimitRule::new(5, Duration::from_secs(15 * 60));
    pub const PAYMENT_CREATE: RateLimitRule = RateLimitRule::new(10, Duration::from_secs(60 * 60));
    pub const PAYMENT_VERIFY: RateLimitRule = RateLimitRule::new(20, Duration::from_secs(60 * 60));
    pub const API_GENERAL: RateLimitRule = RateLimitRule::new(100, Duration::from_secs(15 * 60));
    pub const IMAGE_GENERATION: RateLimitRule = RateLimitRule::new(20, Duration::from_secs(60 * 60));

    pub const fn new(max_requests: u64, window: Duration) -> Self {
        Self { max_requests, window }
    }

    fn window_duration(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.window.as_millis() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs_at(Utc::now())
    }

    pub fn retry_after_secs_at(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            ((millis + 999) / 1000) as u64
        }
    }
}

/// Counter for one key's current window
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    count: u64,
    reset_at: DateTime<Utc>,
}

pub fn rate_limit_key(endpoint: &str, identifier: &str) -> String {
    format!("{}:{}", endpoint, identifier)
}

/// Storage backend for rate limiting
#[derive(Clone)]
pub enum RateLimitStorage {
    /// In-memory storage using DashMap (single instance)
    Memory {
        windows: Arc<DashMap<String, RateLimitWindow>>,
    },
    /// Redis-based storage (shared across instances)
    Redis {
        connection_manager: Arc<redis::aio::ConnectionManager>,
        key_prefix: String,
    },
}

impl RateLimitStorage {
    pub fn new_memory() -> Self {
        Self::Memory {
            windows: Arc::new(DashMap::new()),
        }
    }

    pub async fn new_redis(redis_url: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection_manager = redis::aio::ConnectionManager::new(client).await?;

        info!("Redis connection established for rate limiting");

        Ok(Self::Redis {
            connection_manager: Arc::new(connection_manager),
            key_prefix: key_prefix.to_string(),
        })
    }

    /// Counts one hit against `key` and reports whether it fits the rule's window.
    pub async fn check(&self, key: &str, rule: &RateLimitRule) -> RateLimitDecision {
        match self {
            RateLimitStorage::Memory { windows } => {
                let now = Utc::now();
                if rand::random::<f64>() < SWEEP_PROBABILITY {
                    Self::sweep_expired(windows, now);
                }
                Self::check_memory(windows, key, rule, now)
            }
            RateLimitStorage::Redis {
                connection_manager,
                key_prefix,
            } => match Self::check_redis(connection_manager, key_prefix, key, rule).await {
                Ok(decision) => decision,
                Err(e) => {
                    // Fail closed: an unreachable counter must not lift the quota.
                    error!("Redis rate limit check failed for {}: {}", key, e);
                    RateLimitDecision {
                        allowed: false,
                        limit: rule.max_requests,
                        remaining: 0,
                        reset_at: Utc::now() + rule.window_duration(),
                    }
                }
            },
        }
    }

    fn check_memory(
        windows: &DashMap<String, RateLimitWindow>,
        key: &str,
        rule: &RateLimitRule,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        // The entry guard holds the shard lock, so reset + increment are one step per key.
        let mut window = windows.entry(key.to_string()).or_insert_with(|| RateLimitWindow {
            count: 0,
            reset_at: now + rule.window_duration(),
        });

        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + rule.window_duration();
        }

        window.count += 1;

        RateLimitDecision {
            allowed: window.count <= rule.max_requests,
            limit: rule.max_requests,
            remaining: rule.max_requests.saturating_sub(window.count),
            reset_at: window.reset_at,
        }
    }

    fn sweep_expired(windows: &DashMap<String, RateLimitWindow>, now: DateTime<Utc>) {
        let before = windows.len();
        windows.retain(|_, window| now <= window.reset_at + ChronoDuration::seconds(SWEEP_GRACE_SECS));
        debug!("Rate limit sweep removed {} stale windows", before.saturating_sub(windows.len()));
    }

    async fn check_redis(
        connection_manager: &Arc<redis::aio::ConnectionManager>,
        key_prefix: &str,
        key: &str,
        rule: &RateLimitRule,
    ) -> Result<RateLimitDecision, redis::RedisError> {
        use redis::AsyncCommands;

        let redis_key = format!("rate_limit:{}:{}", key_prefix, key);
        let window_ms = rule.window.as_millis() as i64;
        let mut conn = connection_manager.as_ref().clone();

        let count: u64 = conn.incr(&redis_key, 1u64).await?;

        if count == 1 {
            // Set expiration only on first increment so the window stays fixed
            let _: () = conn.pexpire(&redis_key, window_ms).await?;
        }

        let mut ttl_ms: i64 = conn.pttl(&redis_key).await?;
        if ttl_ms < 0 {
            // Counter lost its expiry (e.g. a crash between INCR and PEXPIRE)
            let _: () = conn.pexpire(&redis_key, window_ms).await?;
            ttl_ms = window_ms;
        }

        Ok(RateLimitDecision {
            allowed: count <= rule.max_requests,
            limit: rule.max_requests,
            remaining: rule.max_requests.saturating_sub(count),
            reset_at: Utc::now() + ChronoDuration::milliseconds(ttl_ms),
        })
    }
}

/// Initialize rate limiting storage: Redis when a URL is configured, otherwise in-process.
pub async fn create_rate_limit_storage(
    redis_url: &Option<String>,
    key_prefix: &str,
) -> Result<RateLimitStorage, AppError> {
    match redis_url {
        Some(url) => RateLimitStorage::new_redis(url, key_prefix).await.map_err(|e| {
            error!("Failed to connect to Redis for rate limiting: {}", e);
            AppError::Configuration(format!("Failed to connect to Redis: {}", e))
        }),
        None => {
            warn!("REDIS_URL is not set; rate limits are enforced per instance only");
            Ok(RateLimitStorage::new_memory())
        }
    }
}

/// Per-route quota keyed by `endpoint:identifier`, where the identifier is the
/// authenticated user id or, for anonymous callers, the client IP.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    storage: RateLimitStorage,
    endpoint: &'static str,
    rule: RateLimitRule,
    audit_service: Option<AuditService>,
}

impl RateLimitMiddleware {
    pub fn new(storage: RateLimitStorage, endpoint: &'static str, rule: RateLimitRule) -> Self {
        Self {
            storage,
            endpoint,
            rule,
            audit_service: None,
        }
    }

    /// Record rejected requests as security events.
    pub fn with_audit(mut self, audit_service: AuditService) -> Self {
        self.audit_service = Some(audit_service);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitService {
            service: Arc::new(service),
            middleware: self.clone(),
        })
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    service: Arc<S>,
    middleware: RateLimitMiddleware,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let middleware = self.middleware.clone();

        Box::pin(async move {
            // Skip rate limiting for OPTIONS requests (CORS preflight)
            if req.method() == actix_web::http::Method::OPTIONS {
                return service.call(req).await;
            }

            let user_id = req
                .extensions()
                .get::<AuthenticatedUser>()
                .map(|user| user.user_id);
            let identifier = match user_id {
                Some(user_id) => user_id.to_string(),
                None => client_ip(req.request()),
            };
            let key = rate_limit_key(middleware.endpoint, &identifier);

            let decision = middleware.storage.check(&key, &middleware.rule).await;

            if !decision.allowed {
                warn!(
                    "Rate limit exceeded for {} on {} (limit {})",
                    identifier,
                    req.path(),
                    decision.limit
                );

                if let Some(audit_service) = &middleware.audit_service {
                    let context = AuditContext::from_request(req.request(), user_id);
                    let event = AuditEvent::new(AuditAction::SecurityRateLimitExceeded, AuditResource::Security)
                        .with_status(AuditStatus::Failure)
                        .with_metadata(serde_json::json!({
                            "endpoint": middleware.endpoint,
                            "limit": decision.limit,
                            "reset_at": decision.reset_at.to_rfc3339(),
                        }));
                    audit_service.log(&context, event).await;
                }

                return Err(AppError::TooManyRequests(decision).into());
            }

            let mut res = service.call(req).await?;

            let headers = res.headers_mut();
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(decision.limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(decision.remaining),
            );
            if let Ok(reset) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
                headers.insert(HeaderName::from_static("x-ratelimit-reset"), reset);
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateLimitRule = RateLimitRule::new(3, Duration::from_secs(60));

    #[test]
    fn test_fixed_window_counts_then_rejects() {
        let windows = DashMap::new();
        let now = Utc::now();

        for expected_remaining in [2, 1, 0] {
            let decision = RateLimitStorage::check_memory(&windows, "payment-create:u1", &RULE, now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = RateLimitStorage::check_memory(&windows, "payment-create:u1", &RULE, now);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_at, now + ChronoDuration::seconds(60));
        assert_eq!(rejected.retry_after_secs_at(now + ChronoDuration::milliseconds(20_500)), 40);

        // Other keys have their own window
        assert!(RateLimitStorage::check_memory(&windows, "payment-create:u2", &RULE, now).allowed);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let windows = DashMap::new();
        let start = Utc::now();

        for _ in 0..4 {
            RateLimitStorage::check_memory(&windows, "k", &RULE, start);
        }

        // Still inside the window at exactly reset_at
        let at_reset = start + ChronoDuration::seconds(60);
        assert!(!RateLimitStorage::check_memory(&windows, "k", &RULE, at_reset).allowed);

        let later = at_reset + ChronoDuration::milliseconds(1);
        let decision = RateLimitStorage::check_memory(&windows, "k", &RULE, later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, later + ChronoDuration::seconds(60));
    }

    #[test]
    fn test_sweep_keeps_recent_windows() {
        let windows = DashMap::new();
        let start = Utc::now();
        RateLimitStorage::check_memory(&windows, "old", &RULE, start);
        RateLimitStorage::check_memory(&windows, "fresh", &RULE, start + ChronoDuration::seconds(100));

        // "old" reset at +60s, so it is still within the 60s grace at +119s
        RateLimitStorage::sweep_expired(&windows, start + ChronoDuration::seconds(119));
        assert_eq!(windows.len(), 2);

        RateLimitStorage::sweep_expired(&windows, start + ChronoDuration::seconds(121));
        assert!(windows.get("old").is_none());
        assert!(windows.get("fresh").is_some());
    }

    #[test]
    fn test_rate_limit_key_format() {
        assert_eq!(rate_limit_key("payment-verify", "1.2.3.4"), "payment-verify:1.2.3.4");
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_quota() {
        let storage = RateLimitStorage::new_memory();
        let rule = RateLimitRule::new(25, Duration::from_secs(60));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.check("api:shared", &rule).await.allowed })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 25);
    }
}

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
};
use futures_util::future::{Ready, ok};
use log::{debug, error, info, warn};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::db::stores::UserStore;
use crate::error::AppError;
use crate::middleware::rate_limiting::{RateLimitRule, RateLimitStorage, rate_limit_key};
use crate::models::AuthenticatedUser;
use crate::services::audit_service::{
    AuditAction, AuditContext, AuditEvent, AuditResource, AuditService, AuditStatus,
};
use crate::services::auth::JwtKeys;
use crate::services::auth::jwt::new_user_from_claims;
use crate::utils::request_info::client_ip;

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized. Please sign in to continue.";

/// Bearer-token authentication for `/api/*`.
///
/// Validates the session token, creates the user row on first sight (granting the
/// signup bonus through the ledger) and puts an [`AuthenticatedUser`] into the
/// request extensions. Failed attempts are audit-logged and, when an auth limiter
/// is attached, counted per client IP.
#[derive(Clone)]
pub struct SecureAuthentication {
    keys: JwtKeys,
    users: Arc<dyn UserStore>,
    audit: AuditService,
    signup_bonus: i64,
    failure_limiter: Option<RateLimitStorage>,
}

impl SecureAuthentication {
    pub fn new(keys: JwtKeys, users: Arc<dyn UserStore>, audit: AuditService, signup_bonus: i64) -> Self {
        debug!("SecureAuthentication::new called");
        Self {
            keys,
            users,
            audit,
            signup_bonus,
            failure_limiter: None,
        }
    }

    /// Reject further attempts from an IP once it has failed `RateLimitRule::AUTH` times.
    pub fn with_failure_limiter(mut self, storage: RateLimitStorage) -> Self {
        self.failure_limiter = Some(storage);
        self
    }

    async fn authenticate(&self, req: &ServiceRequest) -> Result<AuthenticatedUser, AppError> {
        let token = bearer_token(req)?;
        let claims = self.keys.verify_token(token)?;
        let new_user = new_user_from_claims(&claims)?;

        let (user, created) = self.users.ensure_user(&new_user, self.signup_bonus).await?;
        if created {
            info!("Created user {} with {} signup credits", user.id, self.signup_bonus);
            self.audit
                .log(
                    &AuditContext::from_request(req.request(), Some(user.id)),
                    AuditEvent::new(AuditAction::CreditsAdded, AuditResource::Credit)
                        .with_resource_id(user.id)
                        .with_metadata(json!({
                            "amount": self.signup_bonus,
                            "reason": "signup_bonus",
                        })),
                )
                .await;
        }

        Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            full_name: user.full_name,
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format, expected Bearer token".to_string()))?;

    if token.is_empty() {
        return Err(AppError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()));
    }
    Ok(token)
}

impl<S, B> Transform<S, ServiceRequest> for SecureAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecureAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SecureAuthenticationMiddleware {
            service: Arc::new(service),
            auth: self.clone(),
        })
    }
}

#[derive(Clone)]
pub struct SecureAuthenticationMiddleware<S> {
    service: Arc<S>,
    auth: SecureAuthentication,
}

impl<S, B> Service<ServiceRequest> for SecureAuthenticationMiddleware<S>
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
        let auth = self.auth.clone();

        Box::pin(async move {
            // Skip auth check for OPTIONS requests (CORS pre-flight)
            if req.method() == actix_web::http::Method::OPTIONS {
                return service.call(req).await;
            }

            let ip = client_ip(req.request());
            let limiter_key = rate_limit_key("auth", &ip);

            match auth.authenticate(&req).await {
                Ok(user) => {
                    debug!("Authenticated user {} for {}", user.user_id, req.path());
                    req.extensions_mut().insert(user);
                    service.call(req).await
                }
                Err(AppError::Unauthorized(message)) => {
                    warn!("Unauthorized request to {} from {}: {}", req.path(), ip, message);
                    auth.audit
                        .log(
                            &AuditContext::from_request(req.request(), None),
                            AuditEvent::new(AuditAction::SecurityUnauthorizedAccess, AuditResource::Session)
                                .with_status(AuditStatus::Failure)
                                .with_metadata(json!({
                                    "path": req.path(),
                                    "method": req.method().as_str(),
                                    "reason": message,
                                })),
                        )
                        .await;

                    if let Some(limiter) = &auth.failure_limiter {
                        let decision = limiter.check(&limiter_key, &RateLimitRule::AUTH).await;
                        if !decision.allowed {
                            warn!("Too many failed sign-in attempts from {}", ip);
                            return Err(AppError::TooManyRequests(decision).into());
                        }
                    }

                    Err(AppError::Unauthorized(message).into())
                }
                Err(e) => {
                    error!("Authentication failed unexpectedly for {}: {}", req.path(), e);
                    Err(e.into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::stores::LedgerStore;
    use actix_web::{App, HttpResponse, test, web};
    use chrono::Duration;
    use uuid::Uuid;

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().json(json!({ "userId": user.user_id }))
    }

    #[actix_rt::test]
    async fn test_valid_token_creates_user_with_bonus() {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let keys = JwtKeys::from_secret("middleware-secret");
        let app = test::init_service(
            App::new()
                .wrap(SecureAuthentication::new(keys.clone(), shared.clone(), AuditService::new(shared), 100))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let user_id = Uuid::new_v4();
        let token = keys
            .create_token(user_id, "grace@example.com", None, Duration::hours(1))
            .unwrap();

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri("/me")
                .insert_header(("Authorization", format!("Bearer {}", token)))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }

        assert_eq!(store.balance(user_id).await.unwrap(), 100);
        assert_eq!(store.all_transactions(user_id).await.len(), 1);
    }

    #[actix_rt::test]
    async fn test_missing_token_is_rejected_and_audited() {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let app = test::init_service(
            App::new()
                .wrap(SecureAuthentication::new(
                    JwtKeys::from_secret("middleware-secret"),
                    shared.clone(),
                    AuditService::new(shared),
                    100,
                ))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_repeated_failures_hit_auth_limit() {
        let store = MemoryStore::new();
        let shared = Arc::new(store.clone());
        let app = test::init_service(
            App::new()
                .wrap(
                    SecureAuthentication::new(
                        JwtKeys::from_secret("middleware-secret"),
                        shared.clone(),
                        AuditService::new(shared),
                        100,
                    )
                    .with_failure_limiter(RateLimitStorage::new_memory()),
                )
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let mut statuses = Vec::new();
        for _ in 0..6 {
            let req = test::TestRequest::get()
                .uri("/me")
                .insert_header(("Authorization", "Bearer garbage"))
                .insert_header(("x-forwarded-for", "203.0.113.9"))
                .to_request();
            let err = test::try_call_service(&app, req).await.err().unwrap();
            statuses.push(err.as_response_error().status_code().as_u16());
        }
        assert_eq!(statuses, vec![401, 401, 401, 401, 401, 429]);
    }
}

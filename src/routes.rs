use actix_web::{
    HttpRequest,
    error::{JsonPayloadError, PathError, QueryPayloadError},
    web,
};

use crate::app_state::AppState;
use crate::error::AppError;
use crate::handlers;
use crate::middleware::{RateLimitMiddleware, RateLimitRule};

const JSON_BODY_LIMIT: usize = 64 * 1024;

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected JSON body: {}", err);
    AppError::Validation("Invalid JSON body".to_string()).into()
}

fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected query string: {}", err);
    AppError::Validation("Invalid query parameters".to_string()).into()
}

// Path segments are ids; one that does not parse cannot name an existing resource.
fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected path parameter: {}", err);
    AppError::NotFound("Resource not found".to_string()).into()
}

/// Registers shared data, the public routes and the authenticated `/api` scope.
pub fn configure_app(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.app_data(web::JsonConfig::default().limit(JSON_BODY_LIMIT).error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .app_data(web::Data::new(state.payment_service.clone()))
        .app_data(web::Data::new(state.credit_service.clone()))
        .app_data(web::Data::new(state.folder_service.clone()))
        .app_data(web::Data::new(state.image_service.clone()))
        .app_data(web::Data::new(state.audit_service.clone()));

    cfg.service(web::resource("/health").route(web::get().to(handlers::health::health_check)));

    // Gateway webhook: signed by the gateway, so it sits outside the session-auth scope.
    cfg.service(
        web::resource("/api/payments/webhook")
            .route(web::post().to(handlers::payments::razorpay_webhook)),
    );

    cfg.service(
        web::scope("/api")
            .wrap(state.authentication.clone())
            .configure(|api| configure_api_routes(api, state)),
    );
}

/// Routes that require a session. Limiters are wrapped inside the auth middleware so
/// quotas are counted per user.
fn configure_api_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    let limiter = |endpoint: &'static str, rule: RateLimitRule| {
        RateLimitMiddleware::new(state.rate_limit_storage.clone(), endpoint, rule)
            .with_audit(state.audit_service.clone())
    };

    cfg.service(
        web::resource("/payments/create-order")
            .wrap(limiter("payment-create", RateLimitRule::PAYMENT_CREATE))
            .route(web::post().to(handlers::payments::create_order)),
    )
    .service(
        web::resource("/payments/verify")
            .wrap(limiter("payment-verify", RateLimitRule::PAYMENT_VERIFY))
            .route(web::post().to(handlers::payments::verify_payment)),
    )
    .service(
        web::resource("/payments/history")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::get().to(handlers::payments::get_payment_history)),
    )
    .service(
        web::resource("/credits")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::get().to(handlers::credit_handlers::get_credit_balance)),
    )
    .service(
        web::resource("/credits/history")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::get().to(handlers::credit_handlers::get_credit_history)),
    )
    .service(
        web::resource("/generations")
            .wrap(limiter("image-generation", RateLimitRule::IMAGE_GENERATION))
            .route(web::post().to(handlers::generation_handlers::create_generation)),
    )
    .service(
        web::resource("/folders")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::get().to(handlers::folder_handlers::list_folders))
            .route(web::post().to(handlers::folder_handlers::create_folder)),
    )
    .service(
        web::resource("/folders/{id}")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::patch().to(handlers::folder_handlers::update_folder))
            .route(web::delete().to(handlers::folder_handlers::delete_folder)),
    )
    .service(
        web::resource("/images")
            .wrap(limiter("api", RateLimitRule::API_GENERAL))
            .route(web::get().to(handlers::image_handlers::list_images))
            .route(web::patch().to(handlers::image_handlers::move_image))
            .route(web::delete().to(handlers::image_handlers::delete_image)),
    );
}

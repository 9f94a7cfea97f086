use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger};
use dotenv::dotenv;
use std::net::TcpListener;

use imagegen_server::db::{create_pool, run_migrations, verify_connection};
use imagegen_server::middleware::create_rate_limit_storage;
use imagegen_server::routes::configure_app;
use imagegen_server::services::RazorpayService;
use imagegen_server::{AppSettings, AppState, Stores};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_settings = match AppSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load application settings: {}", e);
            log::error!("Cannot start server without valid settings");
            std::process::exit(1);
        }
    };

    let db_pool = match create_pool(&app_settings.database.url).await {
        Ok(pool) => {
            if let Err(e) = verify_connection(&pool).await {
                log::error!("Database connection verification failed: {}", e);
                std::process::exit(1);
            }
            log::info!("Database connection established successfully");
            pool
        }
        Err(e) => {
            log::error!("Failed to create database connection pool: {}", e);
            log::error!("Cannot start server without a working database connection");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&db_pool).await {
        log::error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }

    let gateway = match RazorpayService::new(app_settings.razorpay.clone()) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("Failed to initialize Razorpay client: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Razorpay client ready (stage: {})", gateway.payment_stage());

    let rate_limit_storage = match create_rate_limit_storage(
        &app_settings.rate_limit.redis_url,
        &app_settings.rate_limit.redis_key_prefix,
    )
    .await
    {
        Ok(storage) => storage,
        Err(e) => {
            log::error!("Failed to initialize rate limiting: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(Stores::postgres(db_pool), &app_settings, gateway, rate_limit_storage);
    state.maintenance_service.clone().spawn();

    let host = &app_settings.server.host;
    let port = app_settings.server.port;
    log::info!("Starting server at http://{}:{}", host, port);

    let listener = TcpListener::bind(format!("{}:{}", host, port))?;
    let cors_origins = app_settings.server.cors_origins.clone();

    HttpServer::new(move || {
        let mut cors = Cors::default();
        if cors_origins.iter().any(|origin| origin == "*") {
            cors = cors.allow_any_origin();
        } else {
            for origin in &cors_origins {
                cors = cors.allowed_origin(origin).supports_credentials();
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure(|cfg| configure_app(cfg, &state))
    })
    .listen(listener)?
    .run()
    .await
}

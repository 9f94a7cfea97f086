use log::{debug, error, info, warn};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::AppError;

const CONNECT_ATTEMPTS: u64 = 3;
const MAX_CONNECTIONS: u32 = 10;

/// Opens the Postgres pool, retrying while the database comes up.
pub async fn create_pool(database_url: &str) -> Result<PgPool, AppError> {
    let mut last_error = String::from("no connection attempt was made");

    for attempt in 1..=CONNECT_ATTEMPTS {
        info!("Connecting to Postgres (attempt {}/{})", attempt, CONNECT_ATTEMPTS);

        let result = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await;

        match result {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                let message = e.to_string();
                if message.contains("authentication failed") {
                    error!("Postgres rejected the DATABASE_URL credentials");
                    return Err(AppError::Database(message));
                }
                warn!("Postgres connection attempt {} failed: {}", attempt, message);
                last_error = message;
            }
        }

        if attempt < CONNECT_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(2 * attempt)).await;
        }
    }

    error!("Giving up on Postgres after {} attempts", CONNECT_ATTEMPTS);
    Err(AppError::Database(last_error))
}

pub async fn verify_connection(pool: &PgPool) -> Result<(), AppError> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    debug!("Postgres answered SELECT 1 with {}", one);
    Ok(())
}

/// Applies everything under `migrations/` that has not run yet.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;

    info!("Database migrations applied");
    Ok(())
}

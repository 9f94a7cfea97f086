//! ImageGen payment and credit server
//!
//! Library half of the `server` binary: order creation, checkout verification,
//! gateway webhooks and the credit ledger, exposed so integration tests can
//! drive the real handlers against in-memory stores.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

pub use app_state::{AppState, Stores};
pub use config::AppSettings;
pub use error::AppError;

pub mod credit_handlers;
pub mod folder_handlers;
pub mod generation_handlers;
pub mod health;
pub mod image_handlers;
pub mod payments;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

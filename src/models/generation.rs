use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    ProductOnly,
    ProductWithModel,
}

impl GenerationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationType::ProductOnly => "product_only",
            GenerationType::ProductWithModel => "product_with_model",
        }
    }

    pub fn for_model_image(model_image_url: Option<&str>) -> Self {
        match model_image_url {
            Some(_) => GenerationType::ProductWithModel,
            None => GenerationType::ProductOnly,
        }
    }
}

/// A paid request waiting for the rendering worker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub product_image_url: String,
    pub model_image_url: Option<String>,
    pub generation_type: String,
    pub num_variations: i32,
    pub credits_charged: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGenerationRequest {
    pub user_id: Uuid,
    pub prompt: String,
    pub product_image_url: String,
    pub model_image_url: Option<String>,
    pub generation_type: GenerationType,
    pub num_variations: i32,
    pub credits_charged: i64,
}

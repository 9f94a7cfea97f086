use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A rendered image owned by a user, optionally filed in one of their folders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub url: String,
    pub prompt: String,
    pub generation_type: String,
    pub product_image_url: Option<String>,
    pub model_image_url: Option<String>,
    pub credits_used: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub user_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub url: String,
    pub prompt: String,
    pub generation_type: String,
    pub product_image_url: Option<String>,
    pub model_image_url: Option<String>,
    pub credits_used: i64,
}

/// Which images a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageScope {
    All,
    Folder(Uuid),
}

impl ImageScope {
    /// `None` and `"all"` list everything; anything else must be a folder id.
    pub fn parse(folder_id: Option<&str>) -> Option<Self> {
        match folder_id {
            None | Some("all") | Some("") => Some(ImageScope::All),
            Some(id) => Uuid::parse_str(id).ok().map(ImageScope::Folder),
        }
    }

    pub fn folder_id(&self) -> Option<Uuid> {
        match self {
            ImageScope::All => None,
            ImageScope::Folder(id) => Some(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        let folder = Uuid::new_v4();
        assert_eq!(ImageScope::parse(None), Some(ImageScope::All));
        assert_eq!(ImageScope::parse(Some("all")), Some(ImageScope::All));
        assert_eq!(ImageScope::parse(Some(&folder.to_string())), Some(ImageScope::Folder(folder)));
        assert_eq!(ImageScope::parse(Some("summer")), None);
    }
}

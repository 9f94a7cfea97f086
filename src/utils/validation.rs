//! Request sanitization and schema validation for every mutating endpoint.
//!
//! Input is sanitized first (markup that could execute in a browser is stripped from every
//! string, recursively) and then parsed into a typed request. Failures carry the first
//! human-readable message and never panic, whatever the shape of the input.

use bigdecimal::BigDecimal;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::settings::CreditsConfig;
use crate::error::{AppError, AppResult};
use crate::utils::financial_validation::{parse_usd_amount, validate_purchase_amount};

/// Keys dropped during sanitization so they can never reach object-merging code.
const BLOCKED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

const FOLDER_NAME_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;
const PROMPT_MIN_CHARS: usize = 3;
const PROMPT_MAX_CHARS: usize = 2000;
const MAX_VARIATIONS: i64 = 10;

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>").unwrap());
static IFRAME_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<iframe\b.*?</iframe>").unwrap());
static OBJECT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<object\b.*?</object>").unwrap());
static EMBED_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<embed\b[^>]*>").unwrap());
static QUOTED_EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)on\w+\s*=\s*["'][^"']*["']"#).unwrap());
static BARE_EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)on\w+\s*=\s*[^\s>]*").unwrap());

/// Strips script/iframe/object/embed markup and inline event handlers, then trims.
pub fn sanitize_string(input: &str) -> String {
    let cleaned = SCRIPT_BLOCK.replace_all(input, "");
    let cleaned = IFRAME_BLOCK.replace_all(&cleaned, "");
    let cleaned = OBJECT_BLOCK.replace_all(&cleaned, "");
    let cleaned = EMBED_TAG.replace_all(&cleaned, "");
    let cleaned = QUOTED_EVENT_HANDLER.replace_all(&cleaned, "");
    let cleaned = BARE_EVENT_HANDLER.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Sanitizes every string inside `value`, descending through objects and arrays.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !BLOCKED_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key, sanitize_value(value)))
                .collect(),
        ),
        other => other,
    }
}

/// A typed request parsed from an already-sanitized JSON object.
pub trait RequestSchema: Sized {
    type Context;

    fn from_object(object: &Map<String, Value>, context: &Self::Context) -> Result<Self, String>;
}

pub fn validate_and_sanitize<S: RequestSchema>(raw: &Value, context: &S::Context) -> AppResult<S> {
    let sanitized = sanitize_value(raw.clone());
    let object = sanitized
        .as_object()
        .ok_or_else(|| AppError::Validation("Request body must be a JSON object".to_string()))?;

    S::from_object(object, context).map_err(AppError::Validation)
}

fn required_string(object: &Map<String, Value>, key: &str, required_message: &str) -> Result<String, String> {
    match object.get(key) {
        None | Some(Value::Null) => Err(required_message.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(format!("{} must be a string", key)),
    }
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("{} must be a string", key)),
    }
}

fn is_http_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

fn validate_folder_name(name: &str) -> Result<(), String> {
    let length = name.chars().count();
    if length < 1 {
        return Err("Folder name is required".to_string());
    }
    if length > FOLDER_NAME_MAX_CHARS {
        return Err("Folder name must be less than 100 characters".to_string());
    }
    if name.trim().is_empty() {
        return Err("Folder name cannot be empty".to_string());
    }
    if name.chars().any(|c| matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')) {
        return Err("Folder name contains invalid characters".to_string());
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), String> {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err("Description must be less than 500 characters".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CreatePaymentInput {
    pub amount_usd: BigDecimal,
}

impl RequestSchema for CreatePaymentInput {
    type Context = CreditsConfig;

    fn from_object(object: &Map<String, Value>, credits: &CreditsConfig) -> Result<Self, String> {
        let amount_usd = match object.get("amountUsd") {
            None | Some(Value::Null) => return Err("Amount is required".to_string()),
            Some(Value::Number(number)) => parse_usd_amount(number).map_err(|e| e.user_message())?,
            Some(_) => return Err("Amount must be a valid number".to_string()),
        };

        validate_purchase_amount(&amount_usd, credits).map_err(|e| e.user_message())?;

        Ok(Self { amount_usd })
    }
}

#[derive(Debug, Clone)]
pub struct VerifyPaymentInput {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl RequestSchema for VerifyPaymentInput {
    type Context = ();

    fn from_object(object: &Map<String, Value>, _: &()) -> Result<Self, String> {
        let non_empty = |key: &str, message: &str| -> Result<String, String> {
            let value = required_string(object, key, message)?;
            if value.is_empty() {
                return Err(message.to_string());
            }
            Ok(value)
        };

        Ok(Self {
            razorpay_order_id: non_empty("razorpay_order_id", "Order ID is required")?,
            razorpay_payment_id: non_empty("razorpay_payment_id", "Payment ID is required")?,
            razorpay_signature: non_empty("razorpay_signature", "Signature is required")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateFolderInput {
    pub name: String,
    pub description: Option<String>,
}

impl RequestSchema for CreateFolderInput {
    type Context = ();

    fn from_object(object: &Map<String, Value>, _: &()) -> Result<Self, String> {
        let name = required_string(object, "name", "Folder name is required")?;
        validate_folder_name(&name)?;

        let description = optional_string(object, "description")?;
        if let Some(description) = &description {
            validate_description(description)?;
        }

        Ok(Self {
            name: name.trim().to_string(),
            description,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpdateFolderInput {
    pub name: Option<String>,
    /// `Some("")` when the caller explicitly cleared the description with `null`.
    pub description: Option<String>,
}

impl RequestSchema for UpdateFolderInput {
    type Context = ();

    fn from_object(object: &Map<String, Value>, _: &()) -> Result<Self, String> {
        let name = optional_string(object, "name")?;
        if let Some(name) = &name {
            validate_folder_name(name)?;
        }

        let description = match object.get("description") {
            None => None,
            Some(Value::Null) => Some(String::new()),
            Some(Value::String(s)) => {
                validate_description(s)?;
                Some(s.clone())
            }
            Some(_) => return Err("description must be a string".to_string()),
        };

        Ok(Self {
            name: name.map(|n| n.trim().to_string()),
            description,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerateImageInput {
    pub prompt: String,
    pub product_image_url: String,
    pub model_image_url: Option<String>,
    pub num_variations: i32,
}

impl RequestSchema for GenerateImageInput {
    type Context = ();

    fn from_object(object: &Map<String, Value>, _: &()) -> Result<Self, String> {
        let prompt = required_string(object, "prompt", "Prompt is required")?;
        let prompt_length = prompt.chars().count();
        if prompt_length < PROMPT_MIN_CHARS {
            return Err("Prompt must be at least 3 characters".to_string());
        }
        if prompt_length > PROMPT_MAX_CHARS {
            return Err("Prompt must be less than 2000 characters".to_string());
        }
        if prompt.trim().is_empty() {
            return Err("Prompt cannot be empty".to_string());
        }

        let product_image_url = required_string(object, "productImageUrl", "Product image is required")?;
        if !is_http_url(&product_image_url) {
            return Err("Invalid product image URL".to_string());
        }

        let model_image_url = optional_string(object, "modelImageUrl")?;
        if let Some(url) = &model_image_url {
            if !is_http_url(url) {
                return Err("Invalid model image URL".to_string());
            }
        }

        let num_variations = match object.get("numVariations") {
            None | Some(Value::Null) => 1,
            Some(Value::Number(number)) => {
                let count = number
                    .as_i64()
                    .ok_or_else(|| "Number of variations must be an integer".to_string())?;
                if count < 1 {
                    return Err("Minimum 1 variation".to_string());
                }
                if count > MAX_VARIATIONS {
                    return Err("Maximum 10 variations".to_string());
                }
                count as i32
            }
            Some(_) => return Err("Number of variations must be an integer".to_string()),
        };

        Ok(Self {
            prompt,
            product_image_url,
            model_image_url,
            num_variations,
        })
    }
}

/// Moves an image into a folder; `folderId: null` takes it out of any folder.
#[derive(Debug, Clone)]
pub struct MoveImageInput {
    pub image_id: Uuid,
    pub folder_id: Option<Uuid>,
}

impl RequestSchema for MoveImageInput {
    type Context = ();

    fn from_object(object: &Map<String, Value>, _: &()) -> Result<Self, String> {
        let image_id = required_string(object, "imageId", "Image ID is required")?;
        let image_id = Uuid::parse_str(&image_id).map_err(|_| "Invalid image ID".to_string())?;

        let folder_id = optional_string(object, "folderId")?
            .map(|id| Uuid::parse_str(&id).map_err(|_| "Invalid folder ID".to_string()))
            .transpose()?;

        Ok(Self { image_id, folder_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validation_message<T: std::fmt::Debug>(result: AppResult<T>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_strips_executable_markup() {
        assert_eq!(sanitize_string("hello<script>alert(1)</script> world"), "hello world");
        assert_eq!(sanitize_string("<SCRIPT type=\"x\">\nbad()\n</SCRIPT>ok"), "ok");
        assert_eq!(sanitize_string("a<iframe src=x></iframe>b"), "ab");
        assert_eq!(sanitize_string("a<object data=x></object>b"), "ab");
        assert_eq!(sanitize_string("a<embed src=x>b"), "ab");
        assert_eq!(sanitize_string("<img src=x onerror=\"steal()\">"), "<img src=x >");
        assert_eq!(sanitize_string("<b onclick=steal()>hi</b>"), "<b >hi</b>");
        assert_eq!(sanitize_string("  plain text  "), "plain text");
    }

    #[test]
    fn test_sanitize_value_recurses_and_drops_prototype_keys() {
        let raw = json!({
            "name": " <script>x</script>Summer ",
            "__proto__": { "admin": true },
            "constructor": "x",
            "nested": {
                "prototype": 1,
                "tags": ["<embed src=a>clean", 3]
            }
        });

        let sanitized = sanitize_value(raw);
        assert_eq!(
            sanitized,
            json!({
                "name": "Summer",
                "nested": { "tags": ["clean", 3] }
            })
        );
    }

    #[test]
    fn test_create_payment_bounds() {
        let credits = CreditsConfig::default();

        let input: CreatePaymentInput =
            validate_and_sanitize(&json!({ "amountUsd": 10 }), &credits).unwrap();
        assert_eq!(input.amount_usd, BigDecimal::from(10));

        assert_eq!(
            validation_message(validate_and_sanitize::<CreatePaymentInput>(&json!({ "amountUsd": 0.5 }), &credits)),
            "Minimum purchase is $1"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<CreatePaymentInput>(&json!({ "amountUsd": 10000 }), &credits)),
            "Maximum purchase is $9999"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<CreatePaymentInput>(&json!({ "amountUsd": "10" }), &credits)),
            "Amount must be a valid number"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<CreatePaymentInput>(&json!({}), &credits)),
            "Amount is required"
        );
    }

    #[test]
    fn test_verify_payment_requires_all_identifiers() {
        let ok: VerifyPaymentInput = validate_and_sanitize(
            &json!({
                "razorpay_order_id": "order_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": "abc"
            }),
            &(),
        )
        .unwrap();
        assert_eq!(ok.razorpay_order_id, "order_1");

        assert_eq!(
            validation_message(validate_and_sanitize::<VerifyPaymentInput>(
                &json!({ "razorpay_order_id": "", "razorpay_payment_id": "p", "razorpay_signature": "s" }),
                &()
            )),
            "Order ID is required"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<VerifyPaymentInput>(
                &json!({ "razorpay_order_id": "o", "razorpay_payment_id": "p" }),
                &()
            )),
            "Signature is required"
        );
    }

    #[test]
    fn test_folder_schemas() {
        let created: CreateFolderInput =
            validate_and_sanitize(&json!({ "name": "  Summer shoot ", "description": null }), &()).unwrap();
        assert_eq!(created.name, "Summer shoot");
        assert_eq!(created.description, None);

        assert_eq!(
            validation_message(validate_and_sanitize::<CreateFolderInput>(&json!({ "name": "a/b" }), &())),
            "Folder name contains invalid characters"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<CreateFolderInput>(&json!({ "name": "x".repeat(101) }), &())),
            "Folder name must be less than 100 characters"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<CreateFolderInput>(
                &json!({ "name": "ok", "description": "d".repeat(501) }),
                &()
            )),
            "Description must be less than 500 characters"
        );
        // Sanitizing removes the whole value, leaving nothing to name the folder with.
        assert_eq!(
            validation_message(validate_and_sanitize::<CreateFolderInput>(
                &json!({ "name": "<script>x</script>" }),
                &()
            )),
            "Folder name is required"
        );

        let update: UpdateFolderInput = validate_and_sanitize(&json!({ "description": null }), &()).unwrap();
        assert!(update.name.is_none());
        assert_eq!(update.description.as_deref(), Some(""));
    }

    #[test]
    fn test_move_image_schema() {
        let image_id = Uuid::new_v4();
        let folder_id = Uuid::new_v4();

        let input: MoveImageInput =
            validate_and_sanitize(&json!({ "imageId": image_id.to_string(), "folderId": folder_id.to_string() }), &())
                .unwrap();
        assert_eq!(input.image_id, image_id);
        assert_eq!(input.folder_id, Some(folder_id));

        let unfiled: MoveImageInput =
            validate_and_sanitize(&json!({ "imageId": image_id.to_string(), "folderId": null }), &()).unwrap();
        assert!(unfiled.folder_id.is_none());

        assert_eq!(
            validation_message(validate_and_sanitize::<MoveImageInput>(&json!({ "folderId": null }), &())),
            "Image ID is required"
        );
        assert_eq!(
            validation_message(validate_and_sanitize::<MoveImageInput>(
                &json!({ "imageId": image_id.to_string(), "folderId": "shoes" }),
                &()
            )),
            "Invalid folder ID"
        );
    }

    #[test]
    fn test_generate_image_schema() {
        let input: GenerateImageInput = validate_and_sanitize(
            &json!({
                "prompt": "Studio shot on marble",
                "productImageUrl": "https://cdn.example.com/p.png"
            }),
            &(),
        )
        .unwrap();
        assert_eq!(input.num_variations, 1);
        assert!(input.model_image_url.is_none());

        let cases = [
            (json!({ "prompt": "hi", "productImageUrl": "https://x.io/a.png" }), "Prompt must be at least 3 characters"),
            (json!({ "prompt": "   ", "productImageUrl": "https://x.io/a.png" }), "Prompt must be at least 3 characters"),
            (json!({ "prompt": "a shoe", "productImageUrl": "not a url" }), "Invalid product image URL"),
            (
                json!({ "prompt": "a shoe", "productImageUrl": "https://x.io/a.png", "modelImageUrl": "ftp://x.io/m.png" }),
                "Invalid model image URL",
            ),
            (
                json!({ "prompt": "a shoe", "productImageUrl": "https://x.io/a.png", "numVariations": 1.5 }),
                "Number of variations must be an integer",
            ),
            (
                json!({ "prompt": "a shoe", "productImageUrl": "https://x.io/a.png", "numVariations": 11 }),
                "Maximum 10 variations",
            ),
            (
                json!({ "prompt": "a shoe", "productImageUrl": "https://x.io/a.png", "numVariations": 0 }),
                "Minimum 1 variation",
            ),
        ];

        for (raw, expected) in cases {
            assert_eq!(validation_message(validate_and_sanitize::<GenerateImageInput>(&raw, &())), expected);
        }
    }

    #[test]
    fn test_non_object_bodies_are_rejected() {
        let credits = CreditsConfig::default();
        for raw in [json!(null), json!([1, 2]), json!("amount"), json!(12)] {
            assert!(matches!(
                validate_and_sanitize::<CreatePaymentInput>(&raw, &credits),
                Err(AppError::Validation(_))
            ));
        }
    }
}

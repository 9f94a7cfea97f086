use crate::error::AppError;
use crate::models::auth_jwt_claims::{Claims, UserMetadata};
use crate::models::NewUser;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, trace, warn};
use uuid::Uuid;

/// Role the identity provider puts on signed-in sessions
pub const AUTHENTICATED_ROLE: &str = "authenticated";

/// HS256 keys for session tokens issued by the identity provider.
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(jwt_secret: &str) -> Self {
        let secret = jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Verify a session token and extract the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        trace!("Verifying session token");

        let mut validation = Validation::new(Algorithm::HS256);
        // Provider tokens carry aud = "authenticated"; the signature is what we trust.
        validation.validate_aud = false;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            warn!("Session token rejected: {}", err);
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Session expired. Please sign in again.".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::Unauthorized("Invalid token signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => {
                    AppError::Unauthorized("Token not yet valid".to_string())
                }
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => {
                    AppError::Unauthorized(format!("Token missing required claim: {}", claim))
                }
                _ => AppError::Unauthorized("Invalid token".to_string()),
            }
        })?;

        debug!("Session token verified for subject {}", token_data.claims.sub);
        Ok(token_data.claims)
    }

    /// Signs a session token the way the identity provider does. Used by local tooling and tests.
    pub fn create_token(
        &self,
        user_id: Uuid,
        email: &str,
        full_name: Option<&str>,
        valid_for: Duration,
    ) -> Result<String, AppError> {
        let iat = Utc::now();
        let exp = iat + valid_for;

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp().max(0) as usize,
            iat: Some(iat.timestamp().max(0) as usize),
            email: Some(email.to_string()),
            role: Some(AUTHENTICATED_ROLE.to_string()),
            user_metadata: UserMetadata {
                full_name: full_name.map(str::to_string),
                name: None,
                avatar_url: None,
            },
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
    }
}

/// Identity for the user row, taken from verified claims.
pub fn new_user_from_claims(claims: &Claims) -> Result<NewUser, AppError> {
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user ID format in token".to_string()))?;

    let email = claims
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Token missing email".to_string()))?
        .to_string();

    let metadata = &claims.user_metadata;
    Ok(NewUser {
        id,
        email,
        full_name: metadata.full_name.clone().or_else(|| metadata.name.clone()),
        avatar_url: metadata.avatar_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let keys = JwtKeys::from_secret("test-secret-with-enough-length");
        let user_id = Uuid::new_v4();
        let token = keys
            .create_token(user_id, "ada@example.com", Some("Ada"), Duration::hours(1))
            .unwrap();

        let claims = keys.verify_token(&token).unwrap();
        let user = new_user_from_claims(&claims).unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.full_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens_are_rejected() {
        let keys = JwtKeys::from_secret("secret-one");
        let other = JwtKeys::from_secret("secret-two");
        let token = keys
            .create_token(Uuid::new_v4(), "a@example.com", None, Duration::hours(1))
            .unwrap();
        assert!(matches!(other.verify_token(&token), Err(AppError::Unauthorized(_))));

        let expired = keys
            .create_token(Uuid::new_v4(), "a@example.com", None, Duration::hours(-2))
            .unwrap();
        assert!(matches!(keys.verify_token(&expired), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_subject_must_be_uuid() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            exp: 0,
            iat: None,
            email: Some("a@example.com".to_string()),
            role: None,
            user_metadata: UserMetadata::default(),
        };
        assert!(new_user_from_claims(&claims).is_err());
    }
}

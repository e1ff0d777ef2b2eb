//! JWT bearer token verification.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::current_user::CurrentUser, config::Config, errors::Error};

/// Claims carried by the dashboard's access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,           // Subject (user ID)
    pub email: Option<String>, // User email, when the provider includes it
    pub exp: i64,              // Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>, // Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>, // Provider role, e.g. "authenticated"
}

/// Verify a bearer token and resolve the user it was issued for
pub fn verify_access_token(token: &str, config: &Config) -> Result<CurrentUser, Error> {
    let secret = config.auth.jwt_secret.as_ref().ok_or_else(|| Error::Internal {
        operation: "verify bearer token: auth.jwt_secret is required".to_string(),
    })?;

    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    match &config.auth.audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<AccessClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated {
            message: Some("Invalid or expired token".to_string()),
        },

        // Anything else is a key or library problem on our side
        _ => Error::Internal {
            operation: format!("verify bearer token: {e}"),
        },
    })?;

    let id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| Error::Unauthenticated {
        message: Some("Invalid token subject".to_string()),
    })?;

    Ok(CurrentUser {
        id,
        email: token_data.claims.email,
    })
}

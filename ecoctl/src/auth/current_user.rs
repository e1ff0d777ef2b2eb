use crate::{
    AppState,
    auth::session,
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use tracing::{debug, instrument, trace};
use utoipa::ToSchema;

/// The authenticated caller, resolved from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: Option<String>,
}

/// Pull the bearer token out of the request headers
/// Returns:
/// - Ok(token): header present and well formed
/// - Err(Unauthenticated): header missing, not UTF-8, or not a Bearer token
fn bearer_token(parts: &Parts) -> Result<&str> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| Error::Unauthenticated {
            message: Some("Missing authorization header".to_string()),
        })?;

    let value = header.to_str().map_err(|_| Error::Unauthenticated {
        message: Some("Invalid authorization header".to_string()),
    })?;

    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::Unauthenticated {
            message: Some("Authorization header must be a Bearer token".to_string()),
        }),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(parts)?;
        trace!("Verifying bearer token");
        let user = session::verify_access_token(token, &state.config)?;
        debug!("Authenticated user {}", abbrev_uuid(&user.id));
        Ok(user)
    }
}

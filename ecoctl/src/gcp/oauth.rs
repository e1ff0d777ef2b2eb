//! OAuth2 consent URL and access-token freshness.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use url::Url;

use super::GcpApi;
use crate::{
    config::GcpConfig,
    crypto::TokenCipher,
    db::{Store, models::connections::ConnectionDBResponse},
    errors::{Error, Result},
    types::abbrev_uuid,
};

/// Access tokens expiring within this window are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Google consent screen URL. `access_type=offline` and `prompt=consent` make Google return a
/// refresh token on every exchange.
pub fn authorization_url(config: &GcpConfig, state: &str) -> Url {
    let mut url = config.auth_base_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("include_granted_scopes", "true")
        .append_pair("state", state);
    url
}

/// Absolute expiry of a token issued at `now` with lifetime `expires_in` seconds. A lifetime
/// past chrono's range is treated as unknown.
pub fn expiry_from(now: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Whether a token with this expiry should be refreshed before use at `now`.
/// Tokens without a known expiry are used as-is.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at - now <= Duration::seconds(REFRESH_MARGIN_SECS))
}

/// Return a usable access token for the connection, refreshing and persisting it first when it
/// is about to expire and a refresh token is stored.
#[instrument(skip_all, fields(user_id = %abbrev_uuid(&connection.user_id)))]
pub async fn fresh_access_token(
    store: &dyn Store,
    gcp: &dyn GcpApi,
    cipher: &TokenCipher,
    connection: &ConnectionDBResponse,
) -> Result<String> {
    let sealed = connection.access_token.as_deref().ok_or(Error::NotConnected)?;
    let access_token = cipher.decrypt(sealed)?;

    let now = Utc::now();
    if !needs_refresh(connection.token_expires_at, now) {
        return Ok(access_token);
    }

    let Some(sealed_refresh) = connection.refresh_token.as_deref() else {
        debug!("Access token is expiring but no refresh token is stored");
        return Ok(access_token);
    };
    let refresh_token = cipher.decrypt(sealed_refresh)?;

    let tokens = gcp.refresh_access_token(&refresh_token).await?;
    let rotated_refresh = tokens.refresh_token.as_deref().map(|t| cipher.encrypt(t)).transpose()?;
    store
        .update_connection_tokens(
            connection.user_id,
            &cipher.encrypt(&tokens.access_token)?,
            rotated_refresh.as_deref(),
            expiry_from(now, tokens.expires_in),
        )
        .await?;

    info!("Refreshed Google access token");
    metrics::counter!("ecoctl_gcp_token_refreshes_total").increment(1);
    Ok(tokens.access_token)
}

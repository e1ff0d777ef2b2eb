use crate::db::models::connections::{ConnectionDBResponse, ConnectionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Consent URL for connecting a Google Cloud account
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUrlResponse {
    pub url: String,
    /// Opaque value echoed back by Google on the redirect
    pub state: String,
}

/// Body of `POST /api/gcp/connect`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectRequest {
    /// Authorization code from the OAuth redirect
    pub code: String,
    /// Redirect URI used to obtain the code; defaults to the configured one
    pub redirect_uri: Option<String>,
}

/// Query of `POST /api/gcp/disconnect`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct DisconnectQuery {
    /// Also delete every synced row for the caller
    #[serde(default)]
    pub purge: bool,
}

/// Connection state as shown to the user. Tokens are never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionSummary {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionSummary {
    pub fn not_connected() -> Self {
        Self {
            connected: false,
            status: None,
            google_account_id: None,
            google_email: None,
            scopes: None,
            last_sync_at: None,
            last_error: None,
            connected_at: None,
        }
    }
}

impl From<&ConnectionDBResponse> for ConnectionSummary {
    fn from(c: &ConnectionDBResponse) -> Self {
        Self {
            connected: c.status != ConnectionStatus::Disconnected,
            status: Some(c.status),
            google_account_id: Some(c.google_account_id.clone()),
            google_email: c.google_email.clone(),
            scopes: c.scopes.clone(),
            last_sync_at: c.last_sync_at,
            last_error: c.last_error.clone(),
            connected_at: Some(c.created_at),
        }
    }
}

/// Result of `POST /api/gcp/disconnect`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DisconnectResponse {
    pub disconnected: bool,
    /// Whether Google accepted the token revocation
    pub revoked: bool,
    /// Rows deleted when `purge=true`
    pub rows_deleted: u64,
}

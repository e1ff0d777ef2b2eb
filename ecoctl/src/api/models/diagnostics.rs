use crate::{auth::current_user::CurrentUser, db::RowCounts, db::models::connections::ConnectionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Token state of the stored connection, without the tokens
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionDebug {
    pub status: ConnectionStatus,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub token_expired: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfigDebug {
    pub billing_export_configured: bool,
    pub carbon_export_configured: bool,
    pub default_region: String,
    pub oauth_client_configured: bool,
}

/// Body of `GET /api/gcp/debug`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugResponse {
    pub user: CurrentUser,
    pub connection: Option<ConnectionDebug>,
    pub row_counts: RowCounts,
    pub config: ConfigDebug,
}

/// Body of `GET /api/test/connection`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub google_account_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Body of `GET /api/test/database`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DatabaseTestResponse {
    pub reachable: bool,
    pub backend: String,
}

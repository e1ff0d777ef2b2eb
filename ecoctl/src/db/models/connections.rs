//! Database models for Google Cloud connections.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connection status stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Disconnected,
    Error,
}

/// Database request for creating or replacing a user's connection
#[derive(Debug, Clone)]
pub struct ConnectionUpsertDBRequest {
    pub user_id: UserId,
    pub google_account_id: String,
    pub google_email: Option<String>,
    /// Sealed access token
    pub access_token: String,
    /// Sealed refresh token. `None` keeps a previously stored one.
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
}

/// Database response for a connection
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConnectionDBResponse {
    pub user_id: UserId,
    pub google_account_id: String,
    pub google_email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
    pub status: ConnectionStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionDBResponse {
    /// A connection can be used for Google calls until it is disconnected.
    pub fn is_usable(&self) -> bool {
        self.status != ConnectionStatus::Disconnected && self.access_token.is_some()
    }
}

/// Outcome of a sync run, recorded on the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Succeeded,
    Failed(String),
}

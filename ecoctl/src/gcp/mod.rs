//! Google Cloud API access.
//!
//! [`GcpApi`] is the seam between the sync logic and Google: OAuth2 token exchange/refresh/revoke,
//! the OAuth2 userinfo endpoint, Cloud Billing, Cloud Resource Manager and BigQuery `jobs.query`.
//! Calls only shape requests and parse responses into the plain structs below. [`GcpClient`] is
//! the `reqwest` implementation; tests point it at a `wiremock` server through the configurable
//! base URLs.

mod client;
pub mod oauth;

pub use client::GcpClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by Google API calls
#[derive(Debug, Error)]
pub enum GcpError {
    /// Google rejected the access token (HTTP 401)
    #[error("{api} rejected the access token")]
    Unauthorized { api: &'static str },

    /// Any other non-success status
    #[error("{api} returned {status}: {body}")]
    Status { api: &'static str, status: u16, body: String },

    /// The request never produced a response
    #[error("{api} request failed: {source}")]
    Transport {
        api: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not have the expected shape
    #[error("failed to decode {api} response: {message}")]
    Decode { api: &'static str, message: String },

    /// A setting needed for this call is missing
    #[error("{what} is not configured")]
    NotConfigured { what: &'static str },

    /// BigQuery accepted the query but did not finish within the request timeout
    #[error("BigQuery job did not complete before the timeout")]
    QueryIncomplete,
}

pub type Result<T> = std::result::Result<T, GcpError>;

/// Response of the OAuth2 token endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: Option<i64>,
    /// Only present on the first exchange (with `access_type=offline`)
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// OAuth2 userinfo (v2) response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// A Cloud Billing account
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpBillingAccount {
    /// Resource name, `billingAccounts/XXXXXX-XXXXXX-XXXXXX`
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub master_billing_account: Option<String>,
}

impl GcpBillingAccount {
    /// The bare account ID without the `billingAccounts/` prefix
    pub fn account_id(&self) -> &str {
        self.name.strip_prefix("billingAccounts/").unwrap_or(&self.name)
    }
}

/// A Cloud Resource Manager (v1) project
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpProject {
    pub project_id: String,
    #[serde(default)]
    pub project_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
}

impl GcpProject {
    pub fn is_active(&self) -> bool {
        self.lifecycle_state.as_deref().is_none_or(|s| s == "ACTIVE")
    }
}

/// Billing info attached to a project
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBillingInfo {
    #[serde(default)]
    pub billing_account_name: Option<String>,
    #[serde(default)]
    pub billing_enabled: bool,
}

impl ProjectBillingInfo {
    pub fn billing_account_id(&self) -> Option<&str> {
        self.billing_account_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| n.strip_prefix("billingAccounts/").unwrap_or(n))
    }
}

/// Rows of a BigQuery result, every cell as BigQuery's string rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Index of a column by name
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Google Cloud API surface used by the sync routes.
#[async_trait]
pub trait GcpApi: Send + Sync {
    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse>;

    /// Obtain a new access token from a refresh token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse>;

    /// Revoke an access or refresh token
    async fn revoke_token(&self, token: &str) -> Result<()>;

    /// Profile of the Google account the token belongs to
    async fn user_info(&self, access_token: &str) -> Result<UserInfo>;

    /// All billing accounts visible to the token (all pages)
    async fn list_billing_accounts(&self, access_token: &str) -> Result<Vec<GcpBillingAccount>>;

    /// All projects visible to the token (all pages)
    async fn list_projects(&self, access_token: &str) -> Result<Vec<GcpProject>>;

    /// Billing info of one project
    async fn project_billing_info(&self, access_token: &str, project_id: &str) -> Result<ProjectBillingInfo>;

    /// Run a standard-SQL query in `project_id` and wait for the result
    async fn run_query(&self, access_token: &str, project_id: &str, sql: &str) -> Result<QueryResult>;
}

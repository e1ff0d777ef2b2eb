//! Database models for projects and billing accounts.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Database request for upserting a project
#[derive(Debug, Clone)]
pub struct ProjectUpsertDBRequest {
    pub user_id: UserId,
    pub project_id: String,
    pub name: Option<String>,
    pub project_number: Option<String>,
    pub lifecycle_state: Option<String>,
    pub billing_account_id: Option<String>,
    pub billing_enabled: bool,
    pub current_month_cost: Decimal,
}

/// Database response for a project
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectDBResponse {
    pub user_id: UserId,
    pub project_id: String,
    pub name: Option<String>,
    pub project_number: Option<String>,
    pub lifecycle_state: Option<String>,
    pub billing_account_id: Option<String>,
    pub billing_enabled: bool,
    pub current_month_cost: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Database request for upserting a billing account
#[derive(Debug, Clone)]
pub struct BillingAccountUpsertDBRequest {
    pub user_id: UserId,
    pub billing_account_id: String,
    pub display_name: String,
    pub open: bool,
    pub master_billing_account: Option<String>,
}

/// Database response for a billing account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillingAccountDBResponse {
    pub user_id: UserId,
    pub billing_account_id: String,
    pub display_name: String,
    pub open: bool,
    pub master_billing_account: Option<String>,
    pub updated_at: DateTime<Utc>,
}

//! Database models for per-service costs and daily cost history.

use crate::types::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Database request for upserting a service's cost in a billing period
#[derive(Debug, Clone)]
pub struct ServiceUsageUpsertDBRequest {
    pub user_id: UserId,
    pub project_id: String,
    pub service_id: String,
    pub service_name: String,
    pub period_start: NaiveDate,
    pub cost: Decimal,
    /// Fraction of the project's cost attributed to this service
    pub share: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceUsageDBResponse {
    pub user_id: UserId,
    pub project_id: String,
    pub service_id: String,
    pub service_name: String,
    pub period_start: NaiveDate,
    pub cost: Decimal,
    pub share: f64,
    pub updated_at: DateTime<Utc>,
}

/// One project's cost on one day
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CostHistoryEntry {
    pub user_id: UserId,
    pub project_id: String,
    pub day: NaiveDate,
    pub cost: Decimal,
}

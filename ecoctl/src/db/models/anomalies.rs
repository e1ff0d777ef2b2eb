//! Database models for detected cost anomalies.

use crate::types::{AnomalyId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// Database request for upserting an anomaly. The status of an existing row is kept.
#[derive(Debug, Clone)]
pub struct AnomalyUpsertDBRequest {
    pub user_id: UserId,
    pub project_id: String,
    pub day: NaiveDate,
    pub expected_cost: Decimal,
    pub actual_cost: Decimal,
    pub deviation_pct: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnomalyDBResponse {
    pub id: AnomalyId,
    pub user_id: UserId,
    pub project_id: String,
    pub day: NaiveDate,
    pub expected_cost: Decimal,
    pub actual_cost: Decimal,
    pub deviation_pct: f64,
    pub severity: Severity,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
}

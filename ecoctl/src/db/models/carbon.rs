//! Database models for carbon footprint rows.

use crate::types::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a carbon figure came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CarbonSource {
    /// Google's Carbon Footprint BigQuery export
    Export,
    /// Derived from service costs and regional grid intensity
    Estimate,
}

#[derive(Debug, Clone)]
pub struct CarbonUpsertDBRequest {
    pub user_id: UserId,
    pub project_id: String,
    pub period_start: NaiveDate,
    pub region: String,
    pub energy_kwh: f64,
    pub carbon_kg: f64,
    pub source: CarbonSource,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CarbonDBResponse {
    pub user_id: UserId,
    pub project_id: String,
    pub period_start: NaiveDate,
    pub region: String,
    pub energy_kwh: f64,
    pub carbon_kg: f64,
    pub source: CarbonSource,
    pub updated_at: DateTime<Utc>,
}

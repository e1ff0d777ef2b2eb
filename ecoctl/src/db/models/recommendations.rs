//! Database models for optimization recommendations.

use crate::types::{RecommendationId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Open,
    Dismissed,
    Applied,
}

/// Database request for upserting a recommendation. The status of an existing row is kept.
#[derive(Debug, Clone)]
pub struct RecommendationUpsertDBRequest {
    pub user_id: UserId,
    pub project_id: String,
    pub recommendation_type: String,
    pub title: String,
    pub description: String,
    pub estimated_monthly_savings: Decimal,
    pub estimated_carbon_reduction_kg: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationDBResponse {
    pub id: RecommendationId,
    pub user_id: UserId,
    pub project_id: String,
    pub recommendation_type: String,
    pub title: String,
    pub description: String,
    pub estimated_monthly_savings: Decimal,
    pub estimated_carbon_reduction_kg: f64,
    pub priority: Priority,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

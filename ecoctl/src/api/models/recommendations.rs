use crate::{
    db::models::recommendations::{Priority, RecommendationDBResponse, RecommendationStatus},
    types::RecommendationId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecommendationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: RecommendationId,
    pub project_id: String,
    pub recommendation_type: String,
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub estimated_monthly_savings: Decimal,
    pub estimated_carbon_reduction_kg: f64,
    pub priority: Priority,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecommendationDBResponse> for RecommendationResponse {
    fn from(r: RecommendationDBResponse) -> Self {
        Self {
            id: r.id,
            project_id: r.project_id,
            recommendation_type: r.recommendation_type,
            title: r.title,
            description: r.description,
            estimated_monthly_savings: r.estimated_monthly_savings,
            estimated_carbon_reduction_kg: r.estimated_carbon_reduction_kg,
            priority: r.priority,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListRecommendationsQuery {
    pub status: Option<RecommendationStatus>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecommendationStatusUpdate {
    pub status: RecommendationStatus,
}

/// Result of `POST /api/gcp/recommendations/generate`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecommendationReport {
    pub generated: usize,
    /// Open recommendations removed because their rule no longer applies
    pub retired: u64,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_estimated_savings: Decimal,
    pub recommendations: Vec<RecommendationResponse>,
}

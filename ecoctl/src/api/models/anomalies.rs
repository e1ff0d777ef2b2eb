use crate::{
    db::models::anomalies::{AnomalyDBResponse, AnomalyStatus, Severity},
    types::AnomalyId,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnomalyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AnomalyId,
    pub project_id: String,
    pub day: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub expected_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub actual_cost: Decimal,
    pub deviation_pct: f64,
    pub severity: Severity,
    pub status: AnomalyStatus,
    pub detected_at: DateTime<Utc>,
}

impl From<AnomalyDBResponse> for AnomalyResponse {
    fn from(a: AnomalyDBResponse) -> Self {
        Self {
            id: a.id,
            project_id: a.project_id,
            day: a.day,
            expected_cost: a.expected_cost,
            actual_cost: a.actual_cost,
            deviation_pct: a.deviation_pct,
            severity: a.severity,
            status: a.status,
            detected_at: a.detected_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListAnomaliesQuery {
    pub status: Option<AnomalyStatus>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnomalyStatusUpdate {
    pub status: AnomalyStatus,
}

/// Result of `POST /api/gcp/detect-anomalies`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnomalyDetectionReport {
    /// Projects with enough history to be evaluated
    pub projects_evaluated: usize,
    pub anomalies_detected: usize,
    pub anomalies: Vec<AnomalyResponse>,
}

use crate::{
    db::models::budgets::{BudgetDBResponse, BudgetPeriod},
    types::BudgetId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// How a budget's spend compares with its amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    OnTrack,
    Warning,
    Exceeded,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BudgetCreate {
    pub name: String,
    /// Limit the budget to one project; omitted means all projects
    pub project_id: Option<String>,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[serde(default)]
    pub period: BudgetPeriod,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_pct: f64,
}

fn default_alert_threshold() -> f64 {
    80.0
}

/// Partial update; absent fields are left unchanged and `"project_id": null` widens the budget
/// to all projects.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BudgetUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub project_id: Option<Option<String>>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    pub alert_threshold_pct: Option<f64>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BudgetResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BudgetId,
    pub name: String,
    pub project_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub period: BudgetPeriod,
    pub alert_threshold_pct: f64,
    /// Current month spend over the budget's projects
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub spend: Decimal,
    pub percent_used: f64,
    pub status: BudgetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetResponse {
    pub fn new(budget: BudgetDBResponse, spend: Decimal, percent_used: f64, status: BudgetStatus) -> Self {
        Self {
            id: budget.id,
            name: budget.name,
            project_id: budget.project_id,
            amount: budget.amount,
            period: budget.period,
            alert_threshold_pct: budget.alert_threshold_pct,
            spend,
            percent_used,
            status,
            created_at: budget.created_at,
            updated_at: budget.updated_at,
        }
    }
}

/// Budgets needing attention plus open anomalies
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub budgets: Vec<BudgetResponse>,
    pub anomalies: Vec<super::anomalies::AnomalyResponse>,
}

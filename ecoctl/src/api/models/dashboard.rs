use super::connections::ConnectionSummary;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceCost {
    pub service_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cost: Decimal,
}

/// Headline cost and carbon figures for the current month
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub connection: ConnectionSummary,
    pub period_start: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_cost: Decimal,
    pub total_carbon_kg: f64,
    pub total_energy_kwh: f64,
    pub project_count: usize,
    pub open_anomalies: usize,
    pub open_recommendations: usize,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
    pub budgets_at_risk: usize,
    /// Costliest services this month, highest first
    pub top_services: Vec<ServiceCost>,
}

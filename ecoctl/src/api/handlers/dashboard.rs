use std::collections::BTreeMap;

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        budgets::BudgetStatus,
        connections::ConnectionSummary,
        dashboard::{DashboardResponse, ServiceCost},
    },
    auth::current_user::CurrentUser,
    db::models::{anomalies::AnomalyStatus, recommendations::RecommendationStatus},
    errors::Result,
    sync::{self, round_f64},
};
use axum::{Json, extract::State};
use rust_decimal::Decimal;

/// Number of services listed on the dashboard
const TOP_SERVICES: usize = 5;

#[utoipa::path(
    get,
    path = "/api/gcp/dashboard",
    tag = "dashboard",
    summary = "Headline cost and carbon figures",
    responses(
        (status = 200, description = "Totals for the current month", body = ApiResponse<DashboardResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_dashboard(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<DashboardResponse>>> {
    let period = sync::current_period();

    let connection = match state.store.get_connection(user.id).await? {
        Some(connection) => ConnectionSummary::from(&connection),
        None => ConnectionSummary::not_connected(),
    };
    let projects = state.store.list_projects(user.id).await?;
    let usage = state.store.list_service_usage(user.id, Some(period)).await?;
    let carbon = state.store.list_carbon(user.id, Some(period)).await?;
    let open_anomalies = state.store.list_anomalies(user.id, Some(AnomalyStatus::Open)).await?;
    let open_recommendations = state
        .store
        .list_recommendations(user.id, Some(RecommendationStatus::Open))
        .await?;
    let budgets = sync::budgets::evaluate_all(&state, user.id).await?;

    let mut by_service: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in &usage {
        *by_service.entry(row.service_name.as_str()).or_default() += row.cost;
    }
    let mut top_services: Vec<ServiceCost> = by_service
        .into_iter()
        .map(|(service_name, cost)| ServiceCost {
            service_name: service_name.to_string(),
            cost,
        })
        .collect();
    top_services.sort_by(|a, b| b.cost.cmp(&a.cost).then_with(|| a.service_name.cmp(&b.service_name)));
    top_services.truncate(TOP_SERVICES);

    Ok(ApiResponse::ok(DashboardResponse {
        connection,
        period_start: period,
        total_cost: projects.iter().map(|p| sync::period_cost(p, period)).sum(),
        total_carbon_kg: round_f64(carbon.iter().map(|c| c.carbon_kg).sum(), 4),
        total_energy_kwh: round_f64(carbon.iter().map(|c| c.energy_kwh).sum(), 4),
        project_count: projects.len(),
        open_anomalies: open_anomalies.len(),
        open_recommendations: open_recommendations.len(),
        potential_savings: open_recommendations.iter().map(|r| r.estimated_monthly_savings).sum(),
        budgets_at_risk: budgets.iter().filter(|b| b.status != BudgetStatus::OnTrack).count(),
        top_services,
    }))
}

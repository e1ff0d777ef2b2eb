use crate::{
    AppState,
    api::models::{
        ApiResponse,
        budgets::{AlertsResponse, BudgetCreate, BudgetResponse, BudgetUpdate},
    },
    auth::current_user::CurrentUser,
    errors::{Error, Result},
    sync::{self, budgets},
    types::{BudgetId, abbrev_uuid},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

fn budget_not_found(id: BudgetId) -> Error {
    Error::NotFound {
        resource: "Budget".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/api/gcp/budgets",
    tag = "budgets",
    summary = "List budgets with current spend",
    responses(
        (status = 200, description = "Budgets ordered by name", body = ApiResponse<Vec<BudgetResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_budgets(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<Vec<BudgetResponse>>>> {
    Ok(ApiResponse::ok(budgets::evaluate_all(&state, user.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/gcp/budgets",
    tag = "budgets",
    summary = "Create a budget",
    description = "Creates a monthly budget. A budget with the same name is replaced.",
    request_body = BudgetCreate,
    responses(
        (status = 201, description = "Budget created", body = ApiResponse<BudgetResponse>),
        (status = 400, description = "Invalid amount or threshold", body = crate::api::models::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn create_budget(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(create): Json<BudgetCreate>,
) -> Result<(StatusCode, Json<ApiResponse<BudgetResponse>>)> {
    let request = budgets::create_request(user.id, create)?;
    let budget = state.store.create_budget(&request).await?;
    let projects = state.store.list_projects(user.id).await?;
    info!("Saved budget {}", budget.name);
    Ok((StatusCode::CREATED, ApiResponse::ok(budgets::evaluate(budget, &projects, sync::current_period()))))
}

#[utoipa::path(
    get,
    path = "/api/gcp/budgets/{id}",
    tag = "budgets",
    summary = "Get a budget",
    params(("id" = uuid::Uuid, Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget with current spend", body = ApiResponse<BudgetResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "Budget not found", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(budget_id = %abbrev_uuid(&id)))]
pub async fn get_budget(
    State(state): State<AppState>,
    Path(id): Path<BudgetId>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<BudgetResponse>>> {
    let budget = state.store.get_budget(user.id, id).await?.ok_or_else(|| budget_not_found(id))?;
    let projects = state.store.list_projects(user.id).await?;
    Ok(ApiResponse::ok(budgets::evaluate(budget, &projects, sync::current_period())))
}

#[utoipa::path(
    patch,
    path = "/api/gcp/budgets/{id}",
    tag = "budgets",
    summary = "Update a budget",
    request_body = BudgetUpdate,
    params(("id" = uuid::Uuid, Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Updated budget", body = ApiResponse<BudgetResponse>),
        (status = 400, description = "Invalid amount or threshold", body = crate::api::models::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "Budget not found", body = crate::api::models::ErrorResponse),
        (status = 409, description = "Another budget has that name", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(budget_id = %abbrev_uuid(&id)))]
pub async fn update_budget(
    State(state): State<AppState>,
    Path(id): Path<BudgetId>,
    user: CurrentUser,
    Json(update): Json<BudgetUpdate>,
) -> Result<Json<ApiResponse<BudgetResponse>>> {
    let request = budgets::update_request(update)?;
    let budget = state
        .store
        .update_budget(user.id, id, &request)
        .await?
        .ok_or_else(|| budget_not_found(id))?;
    let projects = state.store.list_projects(user.id).await?;
    Ok(ApiResponse::ok(budgets::evaluate(budget, &projects, sync::current_period())))
}

#[utoipa::path(
    delete,
    path = "/api/gcp/budgets/{id}",
    tag = "budgets",
    summary = "Delete a budget",
    params(("id" = uuid::Uuid, Path, description = "Budget ID")),
    responses(
        (status = 200, description = "The deleted budget", body = ApiResponse<BudgetResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "Budget not found", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(budget_id = %abbrev_uuid(&id)))]
pub async fn delete_budget(
    State(state): State<AppState>,
    Path(id): Path<BudgetId>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<BudgetResponse>>> {
    let budget = state.store.get_budget(user.id, id).await?.ok_or_else(|| budget_not_found(id))?;
    if !state.store.delete_budget(user.id, id).await? {
        return Err(budget_not_found(id));
    }
    let projects = state.store.list_projects(user.id).await?;
    Ok(ApiResponse::ok(budgets::evaluate(budget, &projects, sync::current_period())))
}

#[utoipa::path(
    get,
    path = "/api/gcp/alerts",
    tag = "budgets",
    summary = "Budgets at risk and open anomalies",
    responses(
        (status = 200, description = "Budgets in warning or exceeded, plus open anomalies", body = ApiResponse<AlertsResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_alerts(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<AlertsResponse>>> {
    Ok(ApiResponse::ok(budgets::alerts(&state, user.id).await?))
}

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        carbon::{CarbonQuery, CarbonResponse, CarbonSyncReport},
    },
    auth::current_user::CurrentUser,
    errors::Result,
    sync,
    types::abbrev_uuid,
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

#[utoipa::path(
    post,
    path = "/api/gcp/sync-carbon",
    tag = "carbon",
    summary = "Sync this month's carbon footprint",
    description = "Reads the Carbon Footprint export when one is configured, otherwise estimates emissions \
                   from synced service costs.",
    responses(
        (status = 200, description = "Sync report", body = ApiResponse<CarbonSyncReport>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "No active GCP connection", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn sync_carbon(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<CarbonSyncReport>>> {
    let report = sync::carbon::sync_carbon(&state, user.id, Utc::now().date_naive()).await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    get,
    path = "/api/gcp/carbon",
    tag = "carbon",
    summary = "List carbon footprint rows",
    params(CarbonQuery),
    responses(
        (status = 200, description = "Carbon rows, newest period first", body = ApiResponse<Vec<CarbonResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_carbon(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<CarbonQuery>,
) -> Result<Json<ApiResponse<Vec<CarbonResponse>>>> {
    let rows = state.store.list_carbon(user.id, query.period_start).await?;
    Ok(ApiResponse::ok(rows.into_iter().map(CarbonResponse::from).collect()))
}

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        recommendations::{ListRecommendationsQuery, RecommendationReport, RecommendationResponse, RecommendationStatusUpdate},
    },
    auth::current_user::CurrentUser,
    errors::{Error, Result},
    sync,
    types::{RecommendationId, abbrev_uuid},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;

#[utoipa::path(
    post,
    path = "/api/gcp/recommendations/generate",
    tag = "recommendations",
    summary = "Generate optimization recommendations",
    description = "Applies the cost and carbon rules to this month's service costs and footprint. Existing \
                   recommendations keep their status.",
    responses(
        (status = 200, description = "Generated recommendations", body = ApiResponse<RecommendationReport>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn generate_recommendations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<RecommendationReport>>> {
    let report = sync::recommendations::generate(&state, user.id, Utc::now().date_naive()).await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    get,
    path = "/api/gcp/recommendations",
    tag = "recommendations",
    summary = "List recommendations",
    params(ListRecommendationsQuery),
    responses(
        (status = 200, description = "Recommendations, largest saving first", body = ApiResponse<Vec<RecommendationResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_recommendations(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListRecommendationsQuery>,
) -> Result<Json<ApiResponse<Vec<RecommendationResponse>>>> {
    let recommendations = state.store.list_recommendations(user.id, query.status).await?;
    Ok(ApiResponse::ok(
        recommendations.into_iter().map(RecommendationResponse::from).collect(),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/gcp/recommendations/{id}",
    tag = "recommendations",
    summary = "Dismiss or apply a recommendation",
    request_body = RecommendationStatusUpdate,
    params(("id" = uuid::Uuid, Path, description = "Recommendation ID")),
    responses(
        (status = 200, description = "Updated recommendation", body = ApiResponse<RecommendationResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "Recommendation not found", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(recommendation_id = %abbrev_uuid(&id)))]
pub async fn update_recommendation(
    State(state): State<AppState>,
    Path(id): Path<RecommendationId>,
    user: CurrentUser,
    Json(update): Json<RecommendationStatusUpdate>,
) -> Result<Json<ApiResponse<RecommendationResponse>>> {
    let recommendation = state
        .store
        .update_recommendation_status(user.id, id, update.status)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Recommendation".to_string(),
            id: id.to_string(),
        })?;
    Ok(ApiResponse::ok(RecommendationResponse::from(recommendation)))
}

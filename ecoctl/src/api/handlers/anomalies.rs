use crate::{
    AppState,
    api::models::{
        ApiResponse,
        anomalies::{AnomalyDetectionReport, AnomalyResponse, AnomalyStatusUpdate, ListAnomaliesQuery},
    },
    auth::current_user::CurrentUser,
    errors::{Error, Result},
    sync,
    types::{AnomalyId, abbrev_uuid},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

#[utoipa::path(
    post,
    path = "/api/gcp/detect-anomalies",
    tag = "anomalies",
    summary = "Detect cost anomalies",
    description = "Compares each project's latest daily cost with its trailing average and records days above the threshold.",
    responses(
        (status = 200, description = "Detection report", body = ApiResponse<AnomalyDetectionReport>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn detect_anomalies(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<AnomalyDetectionReport>>> {
    let report = sync::anomalies::detect_anomalies(&state, user.id).await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    get,
    path = "/api/gcp/anomalies",
    tag = "anomalies",
    summary = "List cost anomalies",
    params(ListAnomaliesQuery),
    responses(
        (status = 200, description = "Anomalies, newest first", body = ApiResponse<Vec<AnomalyResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_anomalies(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListAnomaliesQuery>,
) -> Result<Json<ApiResponse<Vec<AnomalyResponse>>>> {
    let anomalies = state.store.list_anomalies(user.id, query.status).await?;
    Ok(ApiResponse::ok(anomalies.into_iter().map(AnomalyResponse::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/api/gcp/anomalies/{id}",
    tag = "anomalies",
    summary = "Update an anomaly's status",
    request_body = AnomalyStatusUpdate,
    params(("id" = uuid::Uuid, Path, description = "Anomaly ID")),
    responses(
        (status = 200, description = "Updated anomaly", body = ApiResponse<AnomalyResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "Anomaly not found", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(anomaly_id = %abbrev_uuid(&id)))]
pub async fn update_anomaly(
    State(state): State<AppState>,
    Path(id): Path<AnomalyId>,
    user: CurrentUser,
    Json(update): Json<AnomalyStatusUpdate>,
) -> Result<Json<ApiResponse<AnomalyResponse>>> {
    let anomaly = state
        .store
        .update_anomaly_status(user.id, id, update.status)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Anomaly".to_string(),
            id: id.to_string(),
        })?;
    Ok(ApiResponse::ok(AnomalyResponse::from(anomaly)))
}

#[cfg(test)]
mod tests {
    use crate::{db::models::costs::CostHistoryEntry, test_utils::*, types::UserId};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use uuid::Uuid;
    use wiremock::MockServer;

    async fn seed_history(state: &crate::AppState, user_id: UserId, project_id: &str, costs: &[i64]) {
        for (i, cost) in costs.iter().enumerate() {
            state
                .store
                .upsert_cost_history(&CostHistoryEntry {
                    user_id,
                    project_id: project_id.to_string(),
                    day: NaiveDate::from_ymd_opt(2026, 10, 1 + i as u32).unwrap(),
                    cost: Decimal::new(*cost, 0),
                })
                .await
                .unwrap();
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_detect_list_and_acknowledge() {
        let google = MockServer::start().await;
        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        seed_history(&state, user_id, "alpha", &[10, 10, 10, 10, 18]).await;
        seed_history(&state, user_id, "beta", &[10, 10, 10, 10, 11]).await;
        seed_history(&state, user_id, "gamma", &[10, 50]).await;
        let auth = add_auth_header(user_id);

        let response = app.post("/api/gcp/detect-anomalies").add_header(auth.0.clone(), auth.1.clone()).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["projects_evaluated"], 2);
        assert_eq!(body["data"]["anomalies_detected"], 1);
        let anomaly = &body["data"]["anomalies"][0];
        assert_eq!(anomaly["project_id"], "alpha");
        assert_eq!(anomaly["deviation_pct"], 80.0);
        assert_eq!(anomaly["severity"], "medium");
        assert_eq!(anomaly["status"], "open");
        let id = anomaly["id"].as_str().unwrap().to_string();

        // Running detection again keeps one row per project and day
        app.post("/api/gcp/detect-anomalies")
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .assert_status_ok();

        let response = app
            .patch(&format!("/api/gcp/anomalies/{id}"))
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"status": "acknowledged"}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["status"], "acknowledged");

        let open: Value = app
            .get("/api/gcp/anomalies?status=open")
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .json();
        assert_eq!(open["data"].as_array().unwrap().len(), 0);

        let all: Value = app.get("/api/gcp/anomalies").add_header(auth.0, auth.1).await.json();
        assert_eq!(all["data"].as_array().unwrap().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_update_unknown_anomaly_is_not_found() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        app.patch(&format!("/api/gcp/anomalies/{}", Uuid::new_v4()))
            .add_header(auth.0, auth.1)
            .json(&json!({"status": "resolved"}))
            .await
            .assert_status_not_found();
    }

    #[test_log::test(tokio::test)]
    async fn test_anomalies_are_scoped_to_the_caller() {
        let google = MockServer::start().await;
        let (app, state) = create_test_app(&google).await;
        let owner = Uuid::new_v4();
        seed_history(&state, owner, "alpha", &[10, 10, 10, 40]).await;
        let owner_auth = add_auth_header(owner);
        let body: Value = app
            .post("/api/gcp/detect-anomalies")
            .add_header(owner_auth.0, owner_auth.1)
            .await
            .json();
        let id = body["data"]["anomalies"][0]["id"].as_str().unwrap().to_string();

        let other = add_auth_header(Uuid::new_v4());
        app.patch(&format!("/api/gcp/anomalies/{id}"))
            .add_header(other.0, other.1)
            .json(&json!({"status": "resolved"}))
            .await
            .assert_status_not_found();
    }
}

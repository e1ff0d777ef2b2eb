use crate::{
    AppState,
    api::models::{
        ApiResponse,
        costs::{BillingAccountResponse, CostSyncReport, ProjectResponse, ServiceUsageQuery, ServiceUsageResponse},
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
    path = "/api/gcp/sync-costs",
    tag = "costs",
    summary = "Sync billing accounts, projects and costs",
    description = "Pulls billing accounts and projects from Google, reads this month's totals from the \
                   billing export and splits them across projects and services. Partial failures are \
                   listed in `errors`.",
    responses(
        (status = 200, description = "Sync report", body = ApiResponse<CostSyncReport>),
        (status = 401, description = "Unauthorized, or Google rejected the stored credentials", body = crate::api::models::ErrorResponse),
        (status = 404, description = "No active GCP connection", body = crate::api::models::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn sync_costs(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<CostSyncReport>>> {
    let report = sync::costs::sync_costs(&state, user.id, Utc::now().date_naive()).await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    get,
    path = "/api/gcp/projects",
    tag = "costs",
    summary = "List synced projects",
    responses(
        (status = 200, description = "Projects ordered by ID", body = ApiResponse<Vec<ProjectResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_projects(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<Vec<ProjectResponse>>>> {
    let projects = state.store.list_projects(user.id).await?;
    Ok(ApiResponse::ok(projects.into_iter().map(ProjectResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/gcp/billing-accounts",
    tag = "costs",
    summary = "List synced billing accounts",
    responses(
        (status = 200, description = "Billing accounts", body = ApiResponse<Vec<BillingAccountResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_billing_accounts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<BillingAccountResponse>>>> {
    let accounts = state.store.list_billing_accounts(user.id).await?;
    Ok(ApiResponse::ok(accounts.into_iter().map(BillingAccountResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/gcp/services",
    tag = "costs",
    summary = "List per-service costs",
    params(ServiceUsageQuery),
    responses(
        (status = 200, description = "Service costs, newest period first", body = ApiResponse<Vec<ServiceUsageResponse>>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_services(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ServiceUsageQuery>,
) -> Result<Json<ApiResponse<Vec<ServiceUsageResponse>>>> {
    let usage = state.store.list_service_usage(user.id, query.period_start).await?;
    let services = usage
        .into_iter()
        .filter(|u| query.project_id.as_deref().is_none_or(|p| u.project_id == p))
        .map(ServiceUsageResponse::from)
        .collect();
    Ok(ApiResponse::ok(services))
}

#[cfg(test)]
mod tests {
    use crate::{db::models::connections::ConnectionStatus, test_utils::*};
    use serde_json::Value;
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn with_billing_export(google: &MockServer) -> crate::config::Config {
        let mut config = create_test_config(google);
        config.gcp.billing_export_table = Some("billing-proj.billing.gcp_billing_export_v1_0123".to_string());
        config
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_costs_splits_total_across_projects_and_services() {
        let google = MockServer::start().await;
        mount_google_account(&google, &["alpha", "beta"]).await;
        mount_query_result(&google, &["day", "cost"], &[&["2026-10-01", "60"], &["2026-10-02", "1.4E2"]]).await;

        let (app, state) = create_test_app_with_config(with_billing_export(&google)).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        let response = app.post("/api/gcp/sync-costs").add_header(auth.0.clone(), auth.1.clone()).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["projects_synced"], 2);
        assert_eq!(body["data"]["billing_accounts_synced"], 1);
        assert_eq!(body["data"]["services_synced"], 12);
        assert_eq!(body["data"]["total_cost"], 200.0);
        assert_eq!(body["data"]["errors"].as_array().unwrap().len(), 0);

        let projects: Value = app.get("/api/gcp/projects").add_header(auth.0.clone(), auth.1.clone()).await.json();
        let projects = projects["data"].as_array().unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0]["project_id"], "alpha");
        assert_eq!(projects[0]["current_month_cost"], 100.0);
        assert_eq!(projects[0]["billing_account_id"], "012345-6789AB-CDEF01");

        let services: Value = app
            .get("/api/gcp/services?project_id=alpha")
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .json();
        let compute = services["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["service_name"] == "Compute Engine")
            .unwrap()
            .clone();
        assert_eq!(compute["cost"], 40.0);

        let history = state.store.list_cost_history(user_id).await.unwrap();
        assert_eq!(history.len(), 4);

        let connection = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert!(connection.last_sync_at.is_some());
        assert_eq!(connection.status, ConnectionStatus::Active);
    }

    #[test_log::test(tokio::test)]
    async fn test_repeated_sync_does_not_duplicate_rows() {
        let google = MockServer::start().await;
        mount_google_account(&google, &["alpha"]).await;
        mount_query_result(&google, &["day", "cost"], &[&["2026-10-01", "10"]]).await;

        let (app, state) = create_test_app_with_config(with_billing_export(&google)).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        for _ in 0..2 {
            app.post("/api/gcp/sync-costs")
                .add_header(auth.0.clone(), auth.1.clone())
                .await
                .assert_status_ok();
        }

        let counts = state.store.count_rows(user_id).await.unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.billing_accounts, 1);
        assert_eq!(counts.service_usage, 6);
        assert_eq!(counts.cost_history, 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_projects_dropped_between_syncs_leave_the_totals() {
        let google = MockServer::start().await;
        mount_google_account(&google, &["alpha", "beta"]).await;
        mount_query_result(&google, &["day", "cost"], &[&["2026-10-01", "100"]]).await;

        let (app, state) = create_test_app_with_config(with_billing_export(&google)).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        app.post("/api/gcp/sync-costs")
            .add_header(auth.0.clone(), auth.1.clone())
            .await
            .assert_status_ok();

        google.reset().await;
        mount_google_account(&google, &["alpha"]).await;
        mount_query_result(&google, &["day", "cost"], &[&["2026-10-01", "100"]]).await;

        let response = app.post("/api/gcp/sync-costs").add_header(auth.0.clone(), auth.1.clone()).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["projects_synced"], 1);
        assert_eq!(body["data"]["total_cost"], 100.0);

        let dashboard: Value = app.get("/api/gcp/dashboard").add_header(auth.0.clone(), auth.1.clone()).await.json();
        assert_eq!(dashboard["data"]["total_cost"], 100.0);
        assert_eq!(dashboard["data"]["project_count"], 1);
        assert_eq!(dashboard["data"]["top_services"][0]["cost"], 40.0);

        let counts = state.store.count_rows(user_id).await.unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.service_usage, 6);
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_without_export_table_reports_error() {
        let google = MockServer::start().await;
        mount_google_account(&google, &["alpha"]).await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        let response = app.post("/api/gcp/sync-costs").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["projects_synced"], 1);
        assert_eq!(body["data"]["total_cost"], 0.0);
        let errors = body["data"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("billing export table is not configured"));
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_without_connection_is_not_found() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app.post("/api/gcp/sync-costs").add_header(auth.0, auth.1).await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["error"], "No active GCP connection found");
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_with_revoked_credentials_is_unauthorized() {
        let google = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/billing/v1/billingAccounts"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        let response = app.post("/api/gcp/sync-costs").add_header(auth.0, auth.1).await;
        response.assert_status_unauthorized();

        let connection = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert_eq!(connection.status, ConnectionStatus::Error);
        assert!(connection.last_error.is_some());
    }
}

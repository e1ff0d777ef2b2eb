//! Troubleshooting endpoints: connection state, row counts and live checks of Google and the store.

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        diagnostics::{ConfigDebug, ConnectionDebug, ConnectionTestResponse, DatabaseTestResponse, DebugResponse},
    },
    auth::current_user::CurrentUser,
    errors::Result,
    gcp::oauth,
    sync::usable_connection,
    types::abbrev_uuid,
};
use axum::{Json, extract::State};
use chrono::Utc;

#[utoipa::path(
    get,
    path = "/api/gcp/debug",
    tag = "diagnostics",
    summary = "Connection and data diagnostics",
    responses(
        (status = 200, description = "Token state, row counts and integration settings", body = ApiResponse<DebugResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_debug(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<DebugResponse>>> {
    let now = Utc::now();
    let connection = state.store.get_connection(user.id).await?.map(|c| ConnectionDebug {
        status: c.status,
        has_access_token: c.access_token.is_some(),
        has_refresh_token: c.refresh_token.is_some(),
        token_expires_at: c.token_expires_at,
        token_expired: c.token_expires_at.is_some_and(|at| at <= now),
        last_sync_at: c.last_sync_at,
        last_error: c.last_error,
    });
    let row_counts = state.store.count_rows(user.id).await?;
    let gcp = &state.config.gcp;

    Ok(ApiResponse::ok(DebugResponse {
        user,
        connection,
        row_counts,
        config: ConfigDebug {
            billing_export_configured: gcp.billing_export_table.is_some(),
            carbon_export_configured: gcp.carbon_export_table.is_some(),
            default_region: gcp.default_region.clone(),
            oauth_client_configured: !gcp.client_id.is_empty() && gcp.client_secret.is_some(),
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/test/connection",
    tag = "diagnostics",
    summary = "Check the stored Google credentials",
    description = "Calls Google's userinfo endpoint with the stored access token, refreshing it first if needed.",
    responses(
        (status = 200, description = "Google account behind the connection", body = ApiResponse<ConnectionTestResponse>),
        (status = 401, description = "Unauthorized, or Google rejected the stored credentials", body = crate::api::models::ErrorResponse),
        (status = 404, description = "No active GCP connection", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn test_connection(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<ConnectionTestResponse>>> {
    let connection = usable_connection(&state, user.id).await?;
    let access_token = oauth::fresh_access_token(state.store.as_ref(), state.gcp.as_ref(), &state.cipher, &connection).await?;
    let profile = state.gcp.user_info(&access_token).await?;
    Ok(ApiResponse::ok(ConnectionTestResponse {
        google_account_id: profile.id,
        email: profile.email,
        name: profile.name,
    }))
}

#[utoipa::path(
    get,
    path = "/api/test/database",
    tag = "diagnostics",
    summary = "Check the store is reachable",
    responses(
        (status = 200, description = "Store reachable", body = ApiResponse<DatabaseTestResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 500, description = "Store unreachable", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn test_database(State(state): State<AppState>, _user: CurrentUser) -> Result<Json<ApiResponse<DatabaseTestResponse>>> {
    state.store.ping().await?;
    Ok(ApiResponse::ok(DatabaseTestResponse {
        reachable: true,
        backend: state.store.backend().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, method, path},
    };

    #[test_log::test(tokio::test)]
    async fn test_debug_reports_tokens_without_values() {
        let google = MockServer::start().await;
        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        let response = app.get("/api/gcp/debug").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        let body: Value = response.json();
        let data = &body["data"];
        assert_eq!(data["user"]["id"], user_id.to_string());
        assert_eq!(data["connection"]["has_access_token"], true);
        assert_eq!(data["connection"]["token_expired"], false);
        assert_eq!(data["row_counts"]["projects"], 0);
        assert_eq!(data["config"]["oauth_client_configured"], true);
        assert!(!body.to_string().contains(TEST_ACCESS_TOKEN));
    }

    #[test_log::test(tokio::test)]
    async fn test_connection_check_calls_userinfo() {
        let google = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", format!("Bearer {TEST_ACCESS_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1234567890",
                "email": "owner@example.com",
                "name": "Owner"
            })))
            .expect(1)
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        let auth = add_auth_header(user_id);

        let response = app.get("/api/test/connection").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["email"], "owner@example.com");
    }

    #[test_log::test(tokio::test)]
    async fn test_connection_check_refreshes_expiring_token() {
        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.refreshed",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&google)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer ya29.refreshed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1234567890"})))
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        state
            .store
            .update_connection_tokens(
                user_id,
                &state.cipher.encrypt(TEST_ACCESS_TOKEN).unwrap(),
                None,
                Some(Utc::now() + Duration::seconds(10)),
            )
            .await
            .unwrap();
        let auth = add_auth_header(user_id);

        app.get("/api/test/connection")
            .add_header(auth.0, auth.1)
            .await
            .assert_status_ok();

        let stored = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert_eq!(state.cipher.decrypt(stored.access_token.as_deref().unwrap()).unwrap(), "ya29.refreshed");
        // Google did not rotate the refresh token, so the stored one is kept
        assert_eq!(
            state.cipher.decrypt(stored.refresh_token.as_deref().unwrap()).unwrap(),
            "1//test-refresh-token"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_database_check() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app.get("/api/test/database").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({"success": true, "data": {"reachable": true, "backend": "in_memory"}})
        );
    }
}

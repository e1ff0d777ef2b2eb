use crate::{
    AppState,
    api::models::{
        ApiResponse,
        connections::{AuthUrlResponse, ConnectRequest, ConnectionSummary, DisconnectQuery, DisconnectResponse},
    },
    auth::current_user::CurrentUser,
    db::models::connections::ConnectionUpsertDBRequest,
    errors::{Error, Result},
    gcp::oauth,
    types::abbrev_uuid,
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/gcp/auth-url",
    tag = "connection",
    summary = "Get the Google consent URL",
    responses(
        (status = 200, description = "Consent URL and state", body = ApiResponse<AuthUrlResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_auth_url(State(state): State<AppState>, _user: CurrentUser) -> Result<Json<ApiResponse<AuthUrlResponse>>> {
    let oauth_state = Uuid::new_v4().to_string();
    let url = oauth::authorization_url(&state.config.gcp, &oauth_state);
    Ok(ApiResponse::ok(AuthUrlResponse {
        url: url.to_string(),
        state: oauth_state,
    }))
}

#[utoipa::path(
    post,
    path = "/api/gcp/connect",
    tag = "connection",
    summary = "Connect a Google Cloud account",
    description = "Exchange an OAuth authorization code for tokens and store the connection.",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Connection stored", body = ApiResponse<ConnectionSummary>),
        (status = 400, description = "Missing authorization code", body = crate::api::models::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 500, description = "Google rejected the exchange", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn connect(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ApiResponse<ConnectionSummary>>> {
    let code = request.code.trim();
    if code.is_empty() {
        return Err(Error::BadRequest {
            message: "Authorization code is required".to_string(),
        });
    }
    let redirect_uri = request.redirect_uri.as_deref().unwrap_or(&state.config.gcp.redirect_uri);

    let now = Utc::now();
    let tokens = state.gcp.exchange_code(code, redirect_uri).await?;
    let profile = state.gcp.user_info(&tokens.access_token).await?;

    let connection = state
        .store
        .upsert_connection(&ConnectionUpsertDBRequest {
            user_id: user.id,
            google_account_id: profile.id,
            google_email: profile.email,
            access_token: state.cipher.encrypt(&tokens.access_token)?,
            refresh_token: tokens.refresh_token.as_deref().map(|t| state.cipher.encrypt(t)).transpose()?,
            token_expires_at: oauth::expiry_from(now, tokens.expires_in),
            scopes: tokens.scope,
        })
        .await?;

    info!("Connected Google account {}", connection.google_account_id);
    Ok(ApiResponse::ok(ConnectionSummary::from(&connection)))
}

#[utoipa::path(
    get,
    path = "/api/gcp/status",
    tag = "connection",
    summary = "Get the connection status",
    responses(
        (status = 200, description = "Connection summary, `connected: false` when there is none", body = ApiResponse<ConnectionSummary>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_status(State(state): State<AppState>, user: CurrentUser) -> Result<Json<ApiResponse<ConnectionSummary>>> {
    let summary = match state.store.get_connection(user.id).await? {
        Some(connection) => ConnectionSummary::from(&connection),
        None => ConnectionSummary::not_connected(),
    };
    Ok(ApiResponse::ok(summary))
}

#[utoipa::path(
    post,
    path = "/api/gcp/disconnect",
    tag = "connection",
    summary = "Disconnect the Google Cloud account",
    description = "Revokes the stored token at Google (best effort), clears the tokens and optionally deletes all synced data.",
    params(DisconnectQuery),
    responses(
        (status = 200, description = "Disconnected", body = ApiResponse<DisconnectResponse>),
        (status = 401, description = "Unauthorized", body = crate::api::models::ErrorResponse),
        (status = 404, description = "No connection", body = crate::api::models::ErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn disconnect(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<DisconnectQuery>,
) -> Result<Json<ApiResponse<DisconnectResponse>>> {
    let connection = state.store.get_connection(user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "GCP connection".to_string(),
        id: user.id.to_string(),
    })?;

    // Revoking the refresh token also invalidates access tokens minted from it
    let mut revoked = false;
    if let Some(sealed) = connection.refresh_token.as_deref().or(connection.access_token.as_deref()) {
        match state.cipher.decrypt(sealed) {
            Ok(token) => match state.gcp.revoke_token(&token).await {
                Ok(()) => revoked = true,
                Err(e) => warn!("Token revocation failed, disconnecting anyway: {}", e),
            },
            Err(e) => warn!("Stored token could not be decrypted, skipping revocation: {:#}", e),
        }
    }

    state.store.disconnect(user.id).await?;
    let rows_deleted = if query.purge {
        state.store.purge_user_data(user.id).await?
    } else {
        0
    };

    info!("Disconnected GCP account (revoked: {revoked}, rows deleted: {rows_deleted})");
    Ok(ApiResponse::ok(DisconnectResponse {
        disconnected: true,
        revoked,
        rows_deleted,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{
        db::models::{connections::ConnectionStatus, projects::ProjectUpsertDBRequest},
        test_utils::*,
    };
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    #[test_log::test(tokio::test)]
    async fn test_auth_url() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app.get("/api/gcp/auth-url").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        let url = body["data"]["url"].as_str().unwrap();
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(body["data"]["state"].as_str().unwrap()));
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_stores_sealed_tokens() {
        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.access",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "openid email",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&google)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1234567890",
                "email": "owner@example.com",
                "name": "Owner"
            })))
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        let auth = add_auth_header(user_id);

        let response = app
            .post("/api/gcp/connect")
            .add_header(auth.0.clone(), auth.1.clone())
            .json(&json!({"code": "auth-code"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["connected"], true);
        assert_eq!(body["data"]["google_email"], "owner@example.com");
        assert!(body["data"].get("access_token").is_none());

        let stored = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Active);
        let sealed = stored.access_token.unwrap();
        assert_ne!(sealed, "ya29.access");
        assert_eq!(state.cipher.decrypt(&sealed).unwrap(), "ya29.access");
        assert!(stored.token_expires_at.is_some());

        let status = app.get("/api/gcp/status").add_header(auth.0, auth.1).await;
        status.assert_status_ok();
        assert_eq!(status.json::<Value>()["data"]["status"], "active");
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_with_absurd_token_lifetime() {
        let google = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.access",
                "expires_in": i64::MAX,
                "token_type": "Bearer"
            })))
            .mount(&google)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1234567890"})))
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        let auth = add_auth_header(user_id);

        app.post("/api/gcp/connect")
            .add_header(auth.0, auth.1)
            .json(&json!({"code": "auth-code"}))
            .await
            .assert_status_ok();

        let stored = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Active);
        assert!(stored.token_expires_at.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_requires_code() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app
            .post("/api/gcp/connect")
            .add_header(auth.0, auth.1)
            .json(&json!({"code": "  "}))
            .await;
        response.assert_status_bad_request();
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[test_log::test(tokio::test)]
    async fn test_status_without_connection() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app.get("/api/gcp/status").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({"success": true, "data": {"connected": false}}));
    }

    #[test_log::test(tokio::test)]
    async fn test_disconnect_without_connection_is_not_found() {
        let google = MockServer::start().await;
        let (app, _state) = create_test_app(&google).await;
        let auth = add_auth_header(Uuid::new_v4());

        let response = app.post("/api/gcp/disconnect").add_header(auth.0, auth.1).await;
        response.assert_status_not_found();
    }

    #[test_log::test(tokio::test)]
    async fn test_disconnect_with_purge() {
        let google = MockServer::start().await;
        // Revocation failures are tolerated
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&google)
            .await;

        let (app, state) = create_test_app(&google).await;
        let user_id = Uuid::new_v4();
        create_test_connection(&state, user_id).await;
        state
            .store
            .upsert_project(&ProjectUpsertDBRequest {
                user_id,
                project_id: "alpha".to_string(),
                name: None,
                project_number: None,
                lifecycle_state: Some("ACTIVE".to_string()),
                billing_account_id: None,
                billing_enabled: true,
                current_month_cost: Decimal::new(10, 0),
            })
            .await
            .unwrap();

        let auth = add_auth_header(user_id);
        let response = app.post("/api/gcp/disconnect?purge=true").add_header(auth.0, auth.1).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["disconnected"], true);
        assert_eq!(body["data"]["revoked"], false);
        assert_eq!(body["data"]["rows_deleted"], 1);

        let stored = state.store.get_connection(user_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Disconnected);
        assert!(stored.access_token.is_none());
        assert!(state.store.list_projects(user_id).await.unwrap().is_empty());
    }
}

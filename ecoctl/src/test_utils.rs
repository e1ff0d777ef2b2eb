//! Test utilities for HTTP tests.
//!
//! Apps built here run over an [`InMemoryStore`] with every Google endpoint pointed at a
//! `wiremock` server.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, path_regex},
};

use crate::{
    AppState,
    auth::session::AccessClaims,
    config::{Config, DatabaseConfig},
    crypto::TokenCipher,
    db::{
        InMemoryStore,
        models::connections::{ConnectionDBResponse, ConnectionUpsertDBRequest},
    },
    gcp::GcpClient,
    types::UserId,
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-testing-only";
pub const TEST_ENCRYPTION_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
/// Plaintext access token stored by [`create_test_connection`]
pub const TEST_ACCESS_TOKEN: &str = "ya29.test-access-token";

pub fn create_test_config(google: &MockServer) -> Config {
    let base = Url::parse(&google.uri()).expect("mock server URI");
    let mut config = Config {
        database: DatabaseConfig::InMemory,
        encryption_key: Some(TEST_ENCRYPTION_KEY.to_string()),
        // The Prometheus recorder is process-global
        enable_metrics: false,
        ..Default::default()
    };
    config.auth.jwt_secret = Some(TEST_JWT_SECRET.to_string());
    config.gcp.client_id = "test-client.apps.googleusercontent.com".to_string();
    config.gcp.client_secret = Some("test-client-secret".to_string());
    config.gcp.token_url = base.join("/token").expect("mock URL");
    config.gcp.revoke_url = base.join("/revoke").expect("mock URL");
    config.gcp.userinfo_url = base.join("/userinfo").expect("mock URL");
    config.gcp.billing_base_url = base.join("/billing/v1/").expect("mock URL");
    config.gcp.resource_manager_base_url = base.join("/crm/v1/").expect("mock URL");
    config.gcp.bigquery_base_url = base.join("/bigquery/v2/").expect("mock URL");
    config
}

pub async fn create_test_app(google: &MockServer) -> (TestServer, AppState) {
    create_test_app_with_config(create_test_config(google)).await
}

pub async fn create_test_app_with_config(config: Config) -> (TestServer, AppState) {
    crate::install_crypto_provider();
    let cipher = TokenCipher::from_base64_key(config.encryption_key.as_deref().expect("test encryption key"))
        .expect("Failed to create token cipher");
    let gcp = GcpClient::new(config.gcp.clone()).expect("Failed to create GCP client");

    let state = AppState::builder()
        .store(Arc::new(InMemoryStore::new()))
        .gcp(Arc::new(gcp))
        .config(config)
        .cipher(cipher)
        .build();
    let router = crate::build_router(state.clone()).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state)
}

/// A bearer token for `user_id` signed with the test secret
pub fn bearer_token(user_id: UserId) -> String {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        exp: (Utc::now() + Duration::hours(1)).timestamp(),
        aud: Some("authenticated".to_string()),
        role: Some("authenticated".to_string()),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes())).expect("Failed to sign test token")
}

pub fn add_auth_header(user_id: UserId) -> (String, String) {
    ("authorization".to_string(), format!("Bearer {}", bearer_token(user_id)))
}

/// Store an active connection holding [`TEST_ACCESS_TOKEN`], valid for an hour
pub async fn create_test_connection(state: &AppState, user_id: UserId) -> ConnectionDBResponse {
    state
        .store
        .upsert_connection(&ConnectionUpsertDBRequest {
            user_id,
            google_account_id: "1234567890".to_string(),
            google_email: Some("owner@example.com".to_string()),
            access_token: state.cipher.encrypt(TEST_ACCESS_TOKEN).expect("encrypt"),
            refresh_token: Some(state.cipher.encrypt("1//test-refresh-token").expect("encrypt")),
            token_expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: Some("openid email".to_string()),
        })
        .await
        .expect("Failed to create test connection")
}

/// Mock one open billing account and the given active projects, all billed to that account
pub async fn mount_google_account(google: &MockServer, projects: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/billing/v1/billingAccounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "billingAccounts": [{
                "name": "billingAccounts/012345-6789AB-CDEF01",
                "displayName": "Main billing",
                "open": true
            }]
        })))
        .mount(google)
        .await;

    let projects: Vec<_> = projects
        .iter()
        .map(|id| json!({"projectId": id, "name": id, "projectNumber": "42", "lifecycleState": "ACTIVE"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/crm/v1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "projects": projects })))
        .mount(google)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/billing/v1/projects/[^/]+/billingInfo$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "billingAccountName": "billingAccounts/012345-6789AB-CDEF01",
            "billingEnabled": true
        })))
        .mount(google)
        .await;
}

/// Mock a BigQuery query returning `columns` and string `rows`
pub async fn mount_query_result(google: &MockServer, columns: &[&str], rows: &[&[&str]]) {
    let fields: Vec<_> = columns.iter().map(|name| json!({"name": name, "type": "STRING"})).collect();
    let rows: Vec<_> = rows
        .iter()
        .map(|row| json!({"f": row.iter().map(|v| json!({"v": v})).collect::<Vec<_>>()}))
        .collect();
    Mock::given(method("POST"))
        .and(path_regex(r"^/bigquery/v2/projects/[^/]+/queries$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": {"fields": fields},
            "rows": rows
        })))
        .mount(google)
        .await;
}

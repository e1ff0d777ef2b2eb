//! `reqwest` implementation of [`GcpApi`].

use super::{
    GcpApi, GcpBillingAccount, GcpError, GcpProject, ProjectBillingInfo, QueryResult, Result, TokenResponse, UserInfo,
};
use crate::config::GcpConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::{Url, form_urlencoded};

/// Google API client configured from [`GcpConfig`].
#[derive(Clone)]
pub struct GcpClient {
    client: Client,
    config: GcpConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingAccountsPage {
    #[serde(default)]
    billing_accounts: Vec<GcpBillingAccount>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsPage {
    #[serde(default)]
    projects: Vec<GcpProject>,
    next_page_token: Option<String>,
}

impl GcpClient {
    pub fn new(config: GcpConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client, config })
    }

    fn endpoint(base: &Url, path: &str, api: &'static str) -> Result<Url> {
        ensure_slash(base).join(path).map_err(|e| GcpError::Decode {
            api,
            message: format!("invalid URL for {path}: {e}"),
        })
    }

    /// POST an `application/x-www-form-urlencoded` body
    fn form_post(&self, url: Url, pairs: &[(&str, &str)]) -> RequestBuilder {
        let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();
        self.client
            .post(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
    }

    fn client_secret(&self) -> Result<&str> {
        self.config
            .client_secret
            .as_deref()
            .ok_or(GcpError::NotConfigured { what: "gcp.client_secret" })
    }

    async fn send(api: &'static str, request: RequestBuilder) -> Result<String> {
        let response = request.send().await.map_err(|source| GcpError::Transport { api, source })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| GcpError::Transport { api, source })?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("{} rejected the access token", api);
            return Err(GcpError::Unauthorized { api });
        }
        if !status.is_success() {
            warn!("{} returned {}", api, status);
            debug!("{} error body: {}", api, body);
            return Err(GcpError::Status {
                api,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(api: &'static str, request: RequestBuilder) -> Result<T> {
        let body = Self::send(api, request).await?;
        serde_json::from_str(&body).map_err(|e| {
            debug!("{} response body was: {}", api, body);
            GcpError::Decode {
                api,
                message: e.to_string(),
            }
        })
    }
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

fn next_page_token(body: &Value) -> Option<String> {
    body.get("pageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Flatten a BigQuery `jobs.query` response into columns and string cells.
fn parse_query_response(body: &Value) -> Result<QueryResult> {
    if body.get("jobComplete").and_then(Value::as_bool) == Some(false) {
        return Err(GcpError::QueryIncomplete);
    }

    let columns = body
        .pointer("/schema/fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let rows = body
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.get("f")
                        .and_then(Value::as_array)
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|cell| match cell.get("v") {
                                    Some(Value::String(s)) => Some(s.clone()),
                                    Some(Value::Null) | None => None,
                                    Some(other) => Some(other.to_string()),
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(QueryResult { columns, rows })
}

#[async_trait]
impl GcpApi for GcpClient {
    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let secret = self.client_secret()?;
        let request = self.form_post(
            self.config.token_url.clone(),
            &[
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", secret),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ],
        );
        Self::send_json("oauth2 token", request).await
    }

    #[instrument(skip_all)]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let secret = self.client_secret()?;
        let request = self.form_post(
            self.config.token_url.clone(),
            &[
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", secret),
                ("grant_type", "refresh_token"),
            ],
        );
        Self::send_json("oauth2 token", request).await
    }

    #[instrument(skip_all)]
    async fn revoke_token(&self, token: &str) -> Result<()> {
        let request = self.form_post(self.config.revoke_url.clone(), &[("token", token)]);
        Self::send("oauth2 revoke", request).await.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn user_info(&self, access_token: &str) -> Result<UserInfo> {
        let request = self.client.get(self.config.userinfo_url.clone()).bearer_auth(access_token);
        Self::send_json("oauth2 userinfo", request).await
    }

    #[instrument(skip_all)]
    async fn list_billing_accounts(&self, access_token: &str) -> Result<Vec<GcpBillingAccount>> {
        let api = "cloudbilling";
        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = Self::endpoint(&self.config.billing_base_url, "billingAccounts", api)?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: BillingAccountsPage = Self::send_json(api, self.client.get(url).bearer_auth(access_token)).await?;
            accounts.extend(page.billing_accounts);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!("Fetched {} billing accounts", accounts.len());
        Ok(accounts)
    }

    #[instrument(skip_all)]
    async fn list_projects(&self, access_token: &str) -> Result<Vec<GcpProject>> {
        let api = "cloudresourcemanager";
        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = Self::endpoint(&self.config.resource_manager_base_url, "projects", api)?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: ProjectsPage = Self::send_json(api, self.client.get(url).bearer_auth(access_token)).await?;
            projects.extend(page.projects);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!("Fetched {} projects", projects.len());
        Ok(projects)
    }

    #[instrument(skip(self, access_token))]
    async fn project_billing_info(&self, access_token: &str, project_id: &str) -> Result<ProjectBillingInfo> {
        let api = "cloudbilling";
        let url = Self::endpoint(&self.config.billing_base_url, &format!("projects/{project_id}/billingInfo"), api)?;
        Self::send_json(api, self.client.get(url).bearer_auth(access_token)).await
    }

    #[instrument(skip(self, access_token, sql))]
    async fn run_query(&self, access_token: &str, project_id: &str, sql: &str) -> Result<QueryResult> {
        let api = "bigquery";
        let url = Self::endpoint(&self.config.bigquery_base_url, &format!("projects/{project_id}/queries"), api)?;
        let timeout_ms = u64::try_from(self.config.request_timeout.as_millis()).unwrap_or(u64::MAX);
        let request = self.client.post(url).bearer_auth(access_token).json(&serde_json::json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": timeout_ms,
        }));
        let body: Value = Self::send_json(api, request).await?;
        let mut result = parse_query_response(&body)?;

        let Some(mut page_token) = next_page_token(&body) else {
            return Ok(result);
        };
        let job_id = body
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .ok_or_else(|| GcpError::Decode {
                api,
                message: "paged query result without a jobReference".to_string(),
            })?;
        let location = body.pointer("/jobReference/location").and_then(Value::as_str);

        // Large results come back in pages through jobs.getQueryResults
        loop {
            let mut url = Self::endpoint(
                &self.config.bigquery_base_url,
                &format!("projects/{project_id}/queries/{job_id}"),
                api,
            )?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageToken", &page_token);
                if let Some(location) = location {
                    query.append_pair("location", location);
                }
            }
            let page: Value = Self::send_json(api, self.client.get(url).bearer_auth(access_token)).await?;
            result.rows.extend(parse_query_response(&page)?.rows);
            match next_page_token(&page) {
                Some(next) => page_token = next,
                None => break,
            }
        }
        debug!("Fetched {} query rows", result.rows.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GcpClient {
        crate::install_crypto_provider();
        let base = Url::parse(&server.uri()).unwrap();
        let config = GcpConfig {
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
            token_url: base.join("/token").unwrap(),
            revoke_url: base.join("/revoke").unwrap(),
            userinfo_url: base.join("/userinfo").unwrap(),
            billing_base_url: base.join("/billing/v1").unwrap(),
            resource_manager_base_url: base.join("/crm/v1/").unwrap(),
            bigquery_base_url: base.join("/bigquery/v2/").unwrap(),
            ..Default::default()
        };
        GcpClient::new(config).unwrap()
    }

    #[test]
    fn test_ensure_slash() {
        let url = Url::parse("http://example.com/v1").unwrap();
        assert_eq!(ensure_slash(&url).as_str(), "http://example.com/v1/");
        assert_eq!(ensure_slash(&url).join("projects").unwrap().as_str(), "http://example.com/v1/projects");
    }

    #[test]
    fn test_parse_query_response() {
        let body = serde_json::json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "day", "type": "STRING"}, {"name": "cost", "type": "FLOAT"}]},
            "rows": [
                {"f": [{"v": "2026-10-01"}, {"v": "12.5"}]},
                {"f": [{"v": "2026-10-02"}, {"v": null}]}
            ]
        });
        let result = parse_query_response(&body).unwrap();
        assert_eq!(result.columns, vec!["day", "cost"]);
        assert_eq!(result.column("cost"), Some(1));
        assert_eq!(result.rows[0], vec![Some("2026-10-01".to_string()), Some("12.5".to_string())]);
        assert_eq!(result.rows[1][1], None);
    }

    #[test]
    fn test_parse_query_response_incomplete() {
        let body = serde_json::json!({"jobComplete": false});
        assert!(matches!(parse_query_response(&body), Err(GcpError::QueryIncomplete)));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=4%2Fabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "refresh_token": "1//refresh",
                "scope": "openid",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server)
            .exchange_code("4/abc", "http://localhost/callback")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.token");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_unauthorized_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server).user_info("expired").await;
        assert!(matches!(result, Err(GcpError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_list_projects_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v1/projects"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "projects": [{"projectId": "second", "lifecycleState": "ACTIVE"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/v1/projects"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "projects": [{"projectId": "first", "projectNumber": "123", "lifecycleState": "ACTIVE"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let projects = client_for(&server).list_projects("tok").await.unwrap();
        let ids: Vec<&str> = projects.iter().map(|p| p.project_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_billing_base_url_without_trailing_slash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/billing/v1/projects/demo/billingInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "billingAccountName": "billingAccounts/AAA",
                "billingEnabled": true
            })))
            .mount(&server)
            .await;

        let info = client_for(&server).project_billing_info("tok", "demo").await.unwrap();
        assert_eq!(info.billing_account_id(), Some("AAA"));
    }

    #[tokio::test]
    async fn test_run_query_follows_result_pages() {
        let server = MockServer::start().await;
        let schema = serde_json::json!({"fields": [{"name": "day"}, {"name": "cost"}]});
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/demo/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "jobReference": {"projectId": "demo", "jobId": "job_42", "location": "EU"},
                "schema": schema,
                "totalRows": "3",
                "rows": [{"f": [{"v": "2026-10-01"}, {"v": "1"}]}],
                "pageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/demo/queries/job_42"))
            .and(query_param("pageToken", "page-2"))
            .and(query_param("location", "EU"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "schema": schema,
                "totalRows": "3",
                "rows": [{"f": [{"v": "2026-10-02"}, {"v": "2"}]}],
                "pageToken": "page-3"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bigquery/v2/projects/demo/queries/job_42"))
            .and(query_param("pageToken", "page-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "schema": schema,
                "totalRows": "3",
                "rows": [{"f": [{"v": "2026-10-03"}, {"v": "3"}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).run_query("tok", "demo", "SELECT 1").await.unwrap();
        assert_eq!(result.columns, vec!["day", "cost"]);
        let days: Vec<_> = result.rows.iter().map(|r| r[0].as_deref().unwrap()).collect();
        assert_eq!(days, vec!["2026-10-01", "2026-10-02", "2026-10-03"]);
    }

    #[tokio::test]
    async fn test_run_query_page_without_job_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/demo/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "schema": {"fields": [{"name": "day"}]},
                "rows": [{"f": [{"v": "2026-10-01"}]}],
                "pageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).run_query("tok", "demo", "SELECT 1").await;
        assert!(matches!(result, Err(GcpError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_status_error_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bigquery/v2/projects/demo/queries"))
            .respond_with(ResponseTemplate::new(403).set_body_string("billing export dataset not shared"))
            .mount(&server)
            .await;

        let result = client_for(&server).run_query("tok", "demo", "SELECT 1").await;
        match result {
            Err(GcpError::Status { status, body, .. }) => {
                assert_eq!(status, 403);
                assert!(body.contains("not shared"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}

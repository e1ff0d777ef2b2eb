//! # ecoctl: Google Cloud cost and carbon tracking
//!
//! `ecoctl` is the backend of a FinOps/GreenOps dashboard. A user connects their Google Cloud
//! account through OAuth; `ecoctl` then pulls billing accounts, projects and per-service costs from
//! the Cloud Billing, Resource Manager and BigQuery APIs, estimates (or imports) the carbon footprint
//! of that usage, and derives budgets, cost anomalies and optimization recommendations from it.
//!
//! ## Architecture
//!
//! - **HTTP API** ([`api`]): axum handlers under `/api/gcp/*` and `/api/test/*`. Every route
//!   requires a bearer JWT ([`auth`]) and answers with a `{success, data}` or `{error}` envelope.
//! - **Sync** ([`sync`]): cost, carbon, anomaly, budget and recommendation logic. Handlers call
//!   into it; it talks to Google through [`gcp::GcpApi`] and persists through [`db::Store`].
//! - **Storage** ([`db`]): a [`db::Store`] trait with a Postgres implementation (migrations under
//!   `migrations/`) and an in-memory one for demos and tests.
//! - **Google** ([`gcp`]): OAuth code exchange and refresh, plus the REST and BigQuery calls.
//!
//! OAuth tokens are encrypted at rest with AES-256-GCM ([`crypto`]).
//!
//! ## Running
//!
//! ```bash
//! ECOCTL_AUTH__JWT_SECRET=... ECOCTL_ENCRYPTION_KEY=... DATABASE_URL=postgres://... ecoctl -f config.yaml
//! ```
//!
//! See [`config`] for every setting. API docs are served at `/api/docs`.

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod gcp;
pub mod openapi;
pub mod sync;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::{CorsOrigin, DatabaseConfig, PoolSettings};
use crypto::TokenCipher;
use db::{InMemoryStore, PostgresStore, Store};
use gcp::{GcpApi, GcpClient};
use openapi::ApiDoc;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(Arc::new(InMemoryStore::new()))
///     .gcp(Arc::new(GcpClient::new(config.gcp.clone())?))
///     .config(config)
///     .cipher(cipher)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gcp: Arc<dyn GcpApi>,
    pub config: Config,
    pub cipher: TokenCipher,
}

/// Get the ecoctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Install the process-wide rustls crypto provider used by the Google client.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

async fn connect_postgres(url: &str, pool: &PoolSettings) -> anyhow::Result<PgPool> {
    let seconds = |s: u64| (s > 0).then(|| std::time::Duration::from_secs(s));

    let pool = PgPoolOptions::new()
        .max_connections(pool.max_connections)
        .min_connections(pool.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(pool.acquire_timeout_secs))
        .idle_timeout(seconds(pool.idle_timeout_secs))
        .max_lifetime(seconds(pool.max_lifetime_secs))
        .connect(url)
        .await
        .context("Failed to connect to Postgres")?;

    migrator().run(&pool).await.context("Failed to run migrations")?;
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::with_capacity(cors_config.allowed_origins.len());
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a trailing slash, Url::as_str always does
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH, http::Method::DELETE])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the authenticated API, docs, health check, optional Prometheus
/// metrics, CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    use api::handlers::{anomalies, budgets, carbon, connection, costs, dashboard, diagnostics, recommendations};

    let api_routes = Router::new()
        // Connection lifecycle
        .route("/api/gcp/auth-url", get(connection::get_auth_url))
        .route("/api/gcp/connect", post(connection::connect))
        .route("/api/gcp/status", get(connection::get_status))
        .route("/api/gcp/disconnect", post(connection::disconnect))
        // Costs
        .route("/api/gcp/sync-costs", post(costs::sync_costs))
        .route("/api/gcp/projects", get(costs::list_projects))
        .route("/api/gcp/billing-accounts", get(costs::list_billing_accounts))
        .route("/api/gcp/services", get(costs::list_services))
        // Carbon
        .route("/api/gcp/sync-carbon", post(carbon::sync_carbon))
        .route("/api/gcp/carbon", get(carbon::list_carbon))
        // Anomalies
        .route("/api/gcp/detect-anomalies", post(anomalies::detect_anomalies))
        .route("/api/gcp/anomalies", get(anomalies::list_anomalies))
        .route("/api/gcp/anomalies/{id}", patch(anomalies::update_anomaly))
        // Budgets and alerts
        .route("/api/gcp/budgets", get(budgets::list_budgets).post(budgets::create_budget))
        .route(
            "/api/gcp/budgets/{id}",
            get(budgets::get_budget)
                .patch(budgets::update_budget)
                .delete(budgets::delete_budget),
        )
        .route("/api/gcp/alerts", get(budgets::get_alerts))
        // Recommendations
        .route(
            "/api/gcp/recommendations/generate",
            post(recommendations::generate_recommendations),
        )
        .route("/api/gcp/recommendations", get(recommendations::list_recommendations))
        .route("/api/gcp/recommendations/{id}", patch(recommendations::update_recommendation))
        // Overview and diagnostics
        .route("/api/gcp/dashboard", get(dashboard::get_dashboard))
        .route("/api/gcp/debug", get(diagnostics::get_debug))
        .route("/api/test/connection", get(diagnostics::test_connection))
        .route("/api/test/database", get(diagnostics::test_database))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(move || async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router, configuration and database pool.
///
/// 1. [`Application::new`] opens the store (running migrations for Postgres) and builds the router
/// 2. [`Application::serve`] binds the TCP listener and serves until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting ecoctl with configuration: {:#?}", config);
        install_crypto_provider();

        let (store, pool): (Arc<dyn Store>, Option<PgPool>) = match &config.database {
            DatabaseConfig::External { url, pool } => {
                let pool = connect_postgres(url, pool).await?;
                info!("Using Postgres store");
                (Arc::new(PostgresStore::new(pool.clone())), Some(pool))
            }
            DatabaseConfig::InMemory => {
                info!("Using in-memory store; data will not survive a restart");
                (Arc::new(InMemoryStore::new()), None)
            }
        };

        let key = config
            .encryption_key
            .as_deref()
            .context("encryption_key is not configured")?;
        let cipher = TokenCipher::from_base64_key(key)?;
        let gcp = GcpClient::new(config.gcp.clone())?;

        let state = AppState::builder()
            .store(store)
            .gcp(Arc::new(gcp))
            .config(config.clone())
            .cipher(cipher)
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("ecoctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

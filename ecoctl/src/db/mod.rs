//! Data persistence and access.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers, sync orchestration)
//! └──────┬──────┘
//!        │ Arc<dyn Store>
//!        ↓
//! ┌─────────────┬──────────────┐
//! │PostgresStore│ InMemoryStore│
//! └──────┬──────┴──────────────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - one per table, over a PgConnection)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Every row is scoped to the user it was synced for. Writes are upserts keyed on the row's
//! natural key, so running a sync twice leaves one row per key.
//!
//! # Modules
//!
//! - [`handlers`]: Postgres repositories and [`PostgresStore`]
//! - [`in_memory`]: [`InMemoryStore`] for tests and local demos
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types

pub mod errors;
pub mod handlers;
pub mod in_memory;
pub mod models;

#[cfg(test)]
mod tests;

pub use handlers::PostgresStore;
pub use in_memory::InMemoryStore;

use crate::types::{AnomalyId, BudgetId, RecommendationId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use errors::Result;
use models::{
    anomalies::{AnomalyDBResponse, AnomalyStatus, AnomalyUpsertDBRequest},
    budgets::{BudgetCreateDBRequest, BudgetDBResponse, BudgetUpdateDBRequest},
    carbon::{CarbonDBResponse, CarbonUpsertDBRequest},
    connections::{ConnectionDBResponse, ConnectionUpsertDBRequest, SyncOutcome},
    costs::{CostHistoryEntry, ServiceUsageDBResponse, ServiceUsageUpsertDBRequest},
    projects::{BillingAccountDBResponse, BillingAccountUpsertDBRequest, ProjectDBResponse, ProjectUpsertDBRequest},
    recommendations::{RecommendationDBResponse, RecommendationStatus, RecommendationUpsertDBRequest},
};
use serde::Serialize;
use utoipa::ToSchema;

/// Number of rows a user owns in each table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RowCounts {
    pub projects: i64,
    pub billing_accounts: i64,
    pub service_usage: i64,
    pub cost_history: i64,
    pub carbon_footprint: i64,
    pub recommendations: i64,
    pub anomalies: i64,
    pub budgets: i64,
}

/// Storage for everything the API reads and the syncs write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short name of the backend, reported by the database check endpoint
    fn backend(&self) -> &'static str;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;

    // Connections

    /// Create or replace the user's connection, setting it `active`
    async fn upsert_connection(&self, request: &ConnectionUpsertDBRequest) -> Result<ConnectionDBResponse>;

    async fn get_connection(&self, user_id: UserId) -> Result<Option<ConnectionDBResponse>>;

    /// Store a refreshed access token. A `None` refresh token keeps the stored one.
    async fn update_connection_tokens(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Record the result of a sync on the connection
    async fn record_sync(&self, user_id: UserId, outcome: &SyncOutcome) -> Result<()>;

    /// Clear tokens and mark the connection disconnected. Returns false if there was none.
    async fn disconnect(&self, user_id: UserId) -> Result<bool>;

    /// Delete every synced row for the user, keeping the connection row. Returns rows deleted.
    async fn purge_user_data(&self, user_id: UserId) -> Result<u64>;

    // Projects and billing accounts

    async fn upsert_project(&self, request: &ProjectUpsertDBRequest) -> Result<ProjectDBResponse>;

    async fn list_projects(&self, user_id: UserId) -> Result<Vec<ProjectDBResponse>>;

    /// Delete the user's projects not in `active`, along with their service usage and carbon rows
    /// for `period_start`. Returns the number of projects deleted.
    async fn retire_projects(&self, user_id: UserId, active: &[String], period_start: NaiveDate) -> Result<u64>;

    async fn upsert_billing_account(&self, request: &BillingAccountUpsertDBRequest) -> Result<BillingAccountDBResponse>;

    async fn list_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>>;

    // Costs

    async fn upsert_service_usage(&self, request: &ServiceUsageUpsertDBRequest) -> Result<ServiceUsageDBResponse>;

    /// Service costs, optionally restricted to one billing period
    async fn list_service_usage(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<ServiceUsageDBResponse>>;

    async fn upsert_cost_history(&self, entry: &CostHistoryEntry) -> Result<()>;

    /// Daily costs ordered by project then day
    async fn list_cost_history(&self, user_id: UserId) -> Result<Vec<CostHistoryEntry>>;

    // Carbon

    async fn upsert_carbon(&self, request: &CarbonUpsertDBRequest) -> Result<CarbonDBResponse>;

    async fn list_carbon(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<CarbonDBResponse>>;

    // Recommendations

    async fn upsert_recommendation(&self, request: &RecommendationUpsertDBRequest) -> Result<RecommendationDBResponse>;

    async fn list_recommendations(
        &self,
        user_id: UserId,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<RecommendationDBResponse>>;

    async fn update_recommendation_status(
        &self,
        user_id: UserId,
        id: RecommendationId,
        status: RecommendationStatus,
    ) -> Result<Option<RecommendationDBResponse>>;

    /// Delete the user's open recommendations other than `keep`. Dismissed and applied ones stay.
    async fn retire_open_recommendations(&self, user_id: UserId, keep: &[RecommendationId]) -> Result<u64>;

    // Anomalies

    async fn upsert_anomaly(&self, request: &AnomalyUpsertDBRequest) -> Result<AnomalyDBResponse>;

    async fn list_anomalies(&self, user_id: UserId, status: Option<AnomalyStatus>) -> Result<Vec<AnomalyDBResponse>>;

    async fn update_anomaly_status(
        &self,
        user_id: UserId,
        id: AnomalyId,
        status: AnomalyStatus,
    ) -> Result<Option<AnomalyDBResponse>>;

    // Budgets

    /// Create a budget, replacing the user's budget with the same name
    async fn create_budget(&self, request: &BudgetCreateDBRequest) -> Result<BudgetDBResponse>;

    async fn get_budget(&self, user_id: UserId, id: BudgetId) -> Result<Option<BudgetDBResponse>>;

    async fn list_budgets(&self, user_id: UserId) -> Result<Vec<BudgetDBResponse>>;

    async fn update_budget(
        &self,
        user_id: UserId,
        id: BudgetId,
        request: &BudgetUpdateDBRequest,
    ) -> Result<Option<BudgetDBResponse>>;

    async fn delete_budget(&self, user_id: UserId, id: BudgetId) -> Result<bool>;

    // Diagnostics

    async fn count_rows(&self, user_id: UserId) -> Result<RowCounts>;
}

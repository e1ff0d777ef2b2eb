//! Postgres repositories, one per table, and the [`PostgresStore`] built on them.

pub mod anomalies;
pub mod budgets;
pub mod carbon;
pub mod connections;
pub mod costs;
pub mod projects;
pub mod recommendations;

pub use anomalies::Anomalies;
pub use budgets::Budgets;
pub use carbon::Carbon;
pub use connections::Connections;
pub use costs::{CostHistory, ServiceUsage};
pub use projects::{BillingAccounts, Projects};
pub use recommendations::Recommendations;

use super::{
    RowCounts, Store,
    errors::Result,
    models::{
        anomalies::{AnomalyDBResponse, AnomalyStatus, AnomalyUpsertDBRequest},
        budgets::{BudgetCreateDBRequest, BudgetDBResponse, BudgetUpdateDBRequest},
        carbon::{CarbonDBResponse, CarbonUpsertDBRequest},
        connections::{ConnectionDBResponse, ConnectionUpsertDBRequest, SyncOutcome},
        costs::{CostHistoryEntry, ServiceUsageDBResponse, ServiceUsageUpsertDBRequest},
        projects::{BillingAccountDBResponse, BillingAccountUpsertDBRequest, ProjectDBResponse, ProjectUpsertDBRequest},
        recommendations::{RecommendationDBResponse, RecommendationStatus, RecommendationUpsertDBRequest},
    },
};
use crate::types::{AnomalyId, BudgetId, RecommendationId, UserId, abbrev_uuid};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

/// Tables holding synced data, in the order they are purged
const USER_DATA_TABLES: [&str; 8] = [
    "gcp_cost_anomalies",
    "gcp_recommendations",
    "gcp_budgets",
    "gcp_carbon_footprint",
    "gcp_cost_history",
    "gcp_service_usage",
    "gcp_projects",
    "gcp_billing_accounts",
];

/// [`Store`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_connection(&self, request: &ConnectionUpsertDBRequest) -> Result<ConnectionDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Connections::new(&mut conn).upsert(request).await
    }

    async fn get_connection(&self, user_id: UserId) -> Result<Option<ConnectionDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Connections::new(&mut conn).get(user_id).await
    }

    async fn update_connection_tokens(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Connections::new(&mut conn)
            .update_tokens(user_id, access_token, refresh_token, expires_at)
            .await
    }

    async fn record_sync(&self, user_id: UserId, outcome: &SyncOutcome) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Connections::new(&mut conn).record_sync(user_id, outcome).await
    }

    async fn disconnect(&self, user_id: UserId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Connections::new(&mut conn).disconnect(user_id).await
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn purge_user_data(&self, user_id: UserId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for table in USER_DATA_TABLES {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1"))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        debug!("Purged {} rows", deleted);
        Ok(deleted)
    }

    async fn upsert_project(&self, request: &ProjectUpsertDBRequest) -> Result<ProjectDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Projects::new(&mut conn).upsert(request).await
    }

    async fn list_projects(&self, user_id: UserId) -> Result<Vec<ProjectDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Projects::new(&mut conn).list(user_id).await
    }

    #[instrument(skip(self, active), fields(user_id = %abbrev_uuid(&user_id), active = active.len()), err)]
    async fn retire_projects(&self, user_id: UserId, active: &[String], period_start: NaiveDate) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for table in ["gcp_service_usage", "gcp_carbon_footprint"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE user_id = $1 AND period_start = $2 AND NOT (project_id = ANY($3))"
            ))
            .bind(user_id)
            .bind(period_start)
            .bind(active)
            .execute(&mut *tx)
            .await?;
        }
        let retired = sqlx::query("DELETE FROM gcp_projects WHERE user_id = $1 AND NOT (project_id = ANY($2))")
            .bind(user_id)
            .bind(active)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(retired)
    }

    async fn upsert_billing_account(&self, request: &BillingAccountUpsertDBRequest) -> Result<BillingAccountDBResponse> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).upsert(request).await
    }

    async fn list_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).list(user_id).await
    }

    async fn upsert_service_usage(&self, request: &ServiceUsageUpsertDBRequest) -> Result<ServiceUsageDBResponse> {
        let mut conn = self.pool.acquire().await?;
        ServiceUsage::new(&mut conn).upsert(request).await
    }

    async fn list_service_usage(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<ServiceUsageDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        ServiceUsage::new(&mut conn).list(user_id, period_start).await
    }

    async fn upsert_cost_history(&self, entry: &CostHistoryEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        CostHistory::new(&mut conn).upsert(entry).await
    }

    async fn list_cost_history(&self, user_id: UserId) -> Result<Vec<CostHistoryEntry>> {
        let mut conn = self.pool.acquire().await?;
        CostHistory::new(&mut conn).list(user_id).await
    }

    async fn upsert_carbon(&self, request: &CarbonUpsertDBRequest) -> Result<CarbonDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Carbon::new(&mut conn).upsert(request).await
    }

    async fn list_carbon(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<CarbonDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Carbon::new(&mut conn).list(user_id, period_start).await
    }

    async fn upsert_recommendation(&self, request: &RecommendationUpsertDBRequest) -> Result<RecommendationDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Recommendations::new(&mut conn).upsert(request).await
    }

    async fn list_recommendations(
        &self,
        user_id: UserId,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<RecommendationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Recommendations::new(&mut conn).list(user_id, status).await
    }

    async fn update_recommendation_status(
        &self,
        user_id: UserId,
        id: RecommendationId,
        status: RecommendationStatus,
    ) -> Result<Option<RecommendationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Recommendations::new(&mut conn).update_status(user_id, id, status).await
    }

    async fn retire_open_recommendations(&self, user_id: UserId, keep: &[RecommendationId]) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        Recommendations::new(&mut conn).retire_open(user_id, keep).await
    }

    async fn upsert_anomaly(&self, request: &AnomalyUpsertDBRequest) -> Result<AnomalyDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Anomalies::new(&mut conn).upsert(request).await
    }

    async fn list_anomalies(&self, user_id: UserId, status: Option<AnomalyStatus>) -> Result<Vec<AnomalyDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Anomalies::new(&mut conn).list(user_id, status).await
    }

    async fn update_anomaly_status(
        &self,
        user_id: UserId,
        id: AnomalyId,
        status: AnomalyStatus,
    ) -> Result<Option<AnomalyDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Anomalies::new(&mut conn).update_status(user_id, id, status).await
    }

    async fn create_budget(&self, request: &BudgetCreateDBRequest) -> Result<BudgetDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Budgets::new(&mut conn).create(request).await
    }

    async fn get_budget(&self, user_id: UserId, id: BudgetId) -> Result<Option<BudgetDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Budgets::new(&mut conn).get_by_id(user_id, id).await
    }

    async fn list_budgets(&self, user_id: UserId) -> Result<Vec<BudgetDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Budgets::new(&mut conn).list(user_id).await
    }

    async fn update_budget(
        &self,
        user_id: UserId,
        id: BudgetId,
        request: &BudgetUpdateDBRequest,
    ) -> Result<Option<BudgetDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Budgets::new(&mut conn).update(user_id, id, request).await
    }

    async fn delete_budget(&self, user_id: UserId, id: BudgetId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Budgets::new(&mut conn).delete(user_id, id).await
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn count_rows(&self, user_id: UserId) -> Result<RowCounts> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM gcp_projects WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_billing_accounts WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_service_usage WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_cost_history WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_carbon_footprint WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_recommendations WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_cost_anomalies WHERE user_id = $1),
                (SELECT COUNT(*) FROM gcp_budgets WHERE user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RowCounts {
            projects: row.0,
            billing_accounts: row.1,
            service_usage: row.2,
            cost_history: row.3,
            carbon_footprint: row.4,
            recommendations: row.5,
            anomalies: row.6,
            budgets: row.7,
        })
    }
}

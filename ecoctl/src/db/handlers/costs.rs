//! Database repositories for per-service costs and daily cost history.

use crate::{
    db::{
        errors::Result,
        models::costs::{CostHistoryEntry, ServiceUsageDBResponse, ServiceUsageUpsertDBRequest},
    },
    types::{UserId, abbrev_uuid},
};
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::instrument;

pub struct ServiceUsage<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ServiceUsage<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(project_id = %request.project_id, service_id = %request.service_id), err)]
    pub async fn upsert(&mut self, request: &ServiceUsageUpsertDBRequest) -> Result<ServiceUsageDBResponse> {
        let usage = sqlx::query_as::<_, ServiceUsageDBResponse>(
            r#"
            INSERT INTO gcp_service_usage (user_id, project_id, service_id, service_name, period_start, cost, share)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, project_id, service_id, period_start) DO UPDATE SET
                service_name = EXCLUDED.service_name,
                cost = EXCLUDED.cost,
                share = EXCLUDED.share,
                updated_at = NOW()
            RETURNING user_id, project_id, service_id, service_name, period_start, cost, share, updated_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.project_id)
        .bind(&request.service_id)
        .bind(&request.service_name)
        .bind(request.period_start)
        .bind(request.cost)
        .bind(request.share)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(usage)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<ServiceUsageDBResponse>> {
        let usage = sqlx::query_as::<_, ServiceUsageDBResponse>(
            r#"
            SELECT user_id, project_id, service_id, service_name, period_start, cost, share, updated_at
            FROM gcp_service_usage
            WHERE user_id = $1 AND ($2::DATE IS NULL OR period_start = $2)
            ORDER BY period_start DESC, project_id, service_id
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(usage)
    }
}

pub struct CostHistory<'c> {
    db: &'c mut PgConnection,
}

impl<'c> CostHistory<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, entry), fields(project_id = %entry.project_id, day = %entry.day), err)]
    pub async fn upsert(&mut self, entry: &CostHistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gcp_cost_history (user_id, project_id, day, cost)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, project_id, day) DO UPDATE SET cost = EXCLUDED.cost
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.project_id)
        .bind(entry.day)
        .bind(entry.cost)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<CostHistoryEntry>> {
        let entries = sqlx::query_as::<_, CostHistoryEntry>(
            r#"
            SELECT user_id, project_id, day, cost
            FROM gcp_cost_history
            WHERE user_id = $1
            ORDER BY project_id, day
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(entries)
    }
}

//! Database repository for detected cost anomalies.

use crate::{
    db::{
        errors::Result,
        models::anomalies::{AnomalyDBResponse, AnomalyStatus, AnomalyUpsertDBRequest},
    },
    types::{AnomalyId, UserId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const ANOMALY_COLUMNS: &str =
    "id, user_id, project_id, day, expected_cost, actual_cost, deviation_pct, severity, status, detected_at";

pub struct Anomalies<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Anomalies<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh the anomaly for a project and day, keeping its status.
    #[instrument(skip(self, request), fields(project_id = %request.project_id, day = %request.day), err)]
    pub async fn upsert(&mut self, request: &AnomalyUpsertDBRequest) -> Result<AnomalyDBResponse> {
        let query = format!(
            r#"
            INSERT INTO gcp_cost_anomalies (
                id, user_id, project_id, day, expected_cost, actual_cost, deviation_pct, severity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, project_id, day) DO UPDATE SET
                expected_cost = EXCLUDED.expected_cost,
                actual_cost = EXCLUDED.actual_cost,
                deviation_pct = EXCLUDED.deviation_pct,
                severity = EXCLUDED.severity,
                detected_at = NOW()
            RETURNING {ANOMALY_COLUMNS}
            "#
        );
        let anomaly = sqlx::query_as::<_, AnomalyDBResponse>(&query)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(&request.project_id)
            .bind(request.day)
            .bind(request.expected_cost)
            .bind(request.actual_cost)
            .bind(request.deviation_pct)
            .bind(request.severity)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(anomaly)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, status: Option<AnomalyStatus>) -> Result<Vec<AnomalyDBResponse>> {
        let query = format!(
            r#"
            SELECT {ANOMALY_COLUMNS}
            FROM gcp_cost_anomalies
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY day DESC, project_id
            "#
        );
        let anomalies = sqlx::query_as::<_, AnomalyDBResponse>(&query)
            .bind(user_id)
            .bind(status)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(anomalies)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), id = %abbrev_uuid(&id)), err)]
    pub async fn update_status(
        &mut self,
        user_id: UserId,
        id: AnomalyId,
        status: AnomalyStatus,
    ) -> Result<Option<AnomalyDBResponse>> {
        let query = format!(
            r#"
            UPDATE gcp_cost_anomalies SET status = $3
            WHERE user_id = $1 AND id = $2
            RETURNING {ANOMALY_COLUMNS}
            "#
        );
        let anomaly = sqlx::query_as::<_, AnomalyDBResponse>(&query)
            .bind(user_id)
            .bind(id)
            .bind(status)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(anomaly)
    }
}

//! Database repository for carbon footprint rows.

use crate::{
    db::{
        errors::Result,
        models::carbon::{CarbonDBResponse, CarbonUpsertDBRequest},
    },
    types::{UserId, abbrev_uuid},
};
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Carbon<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Carbon<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(project_id = %request.project_id, source = ?request.source), err)]
    pub async fn upsert(&mut self, request: &CarbonUpsertDBRequest) -> Result<CarbonDBResponse> {
        let row = sqlx::query_as::<_, CarbonDBResponse>(
            r#"
            INSERT INTO gcp_carbon_footprint (user_id, project_id, period_start, region, energy_kwh, carbon_kg, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, project_id, period_start) DO UPDATE SET
                region = EXCLUDED.region,
                energy_kwh = EXCLUDED.energy_kwh,
                carbon_kg = EXCLUDED.carbon_kg,
                source = EXCLUDED.source,
                updated_at = NOW()
            RETURNING user_id, project_id, period_start, region, energy_kwh, carbon_kg, source, updated_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.project_id)
        .bind(request.period_start)
        .bind(&request.region)
        .bind(request.energy_kwh)
        .bind(request.carbon_kg)
        .bind(request.source)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<CarbonDBResponse>> {
        let rows = sqlx::query_as::<_, CarbonDBResponse>(
            r#"
            SELECT user_id, project_id, period_start, region, energy_kwh, carbon_kg, source, updated_at
            FROM gcp_carbon_footprint
            WHERE user_id = $1 AND ($2::DATE IS NULL OR period_start = $2)
            ORDER BY period_start DESC, project_id
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows)
    }
}

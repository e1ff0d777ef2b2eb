//! Database repository for optimization recommendations.

use crate::{
    db::{
        errors::Result,
        models::recommendations::{RecommendationDBResponse, RecommendationStatus, RecommendationUpsertDBRequest},
    },
    types::{RecommendationId, UserId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const RECOMMENDATION_COLUMNS: &str = "id, user_id, project_id, recommendation_type, title, description, \
     estimated_monthly_savings, estimated_carbon_reduction_kg, priority, status, created_at, updated_at";

pub struct Recommendations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Recommendations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh a recommendation; a dismissed or applied one stays that way.
    #[instrument(skip(self, request), fields(project_id = %request.project_id, kind = %request.recommendation_type), err)]
    pub async fn upsert(&mut self, request: &RecommendationUpsertDBRequest) -> Result<RecommendationDBResponse> {
        let query = format!(
            r#"
            INSERT INTO gcp_recommendations (
                id, user_id, project_id, recommendation_type, title, description,
                estimated_monthly_savings, estimated_carbon_reduction_kg, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, project_id, recommendation_type) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                estimated_monthly_savings = EXCLUDED.estimated_monthly_savings,
                estimated_carbon_reduction_kg = EXCLUDED.estimated_carbon_reduction_kg,
                priority = EXCLUDED.priority,
                updated_at = NOW()
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        );
        let recommendation = sqlx::query_as::<_, RecommendationDBResponse>(&query)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(&request.project_id)
            .bind(&request.recommendation_type)
            .bind(&request.title)
            .bind(&request.description)
            .bind(request.estimated_monthly_savings)
            .bind(request.estimated_carbon_reduction_kg)
            .bind(request.priority)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(recommendation)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId, status: Option<RecommendationStatus>) -> Result<Vec<RecommendationDBResponse>> {
        let query = format!(
            r#"
            SELECT {RECOMMENDATION_COLUMNS}
            FROM gcp_recommendations
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY estimated_monthly_savings DESC, project_id, recommendation_type
            "#
        );
        let recommendations = sqlx::query_as::<_, RecommendationDBResponse>(&query)
            .bind(user_id)
            .bind(status)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(recommendations)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), id = %abbrev_uuid(&id)), err)]
    pub async fn update_status(
        &mut self,
        user_id: UserId,
        id: RecommendationId,
        status: RecommendationStatus,
    ) -> Result<Option<RecommendationDBResponse>> {
        let query = format!(
            r#"
            UPDATE gcp_recommendations SET status = $3, updated_at = NOW()
            WHERE user_id = $1 AND id = $2
            RETURNING {RECOMMENDATION_COLUMNS}
            "#
        );
        let recommendation = sqlx::query_as::<_, RecommendationDBResponse>(&query)
            .bind(user_id)
            .bind(id)
            .bind(status)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(recommendation)
    }

    /// Delete open recommendations whose rule no longer fires
    #[instrument(skip(self, keep), fields(user_id = %abbrev_uuid(&user_id), keep = keep.len()), err)]
    pub async fn retire_open(&mut self, user_id: UserId, keep: &[RecommendationId]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM gcp_recommendations
            WHERE user_id = $1 AND status = 'open' AND NOT (id = ANY($2))
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

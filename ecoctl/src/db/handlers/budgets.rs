//! Database repository for budgets.

use crate::{
    db::{
        errors::Result,
        models::budgets::{BudgetCreateDBRequest, BudgetDBResponse, BudgetUpdateDBRequest},
    },
    types::{BudgetId, UserId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const BUDGET_COLUMNS: &str =
    "id, user_id, name, project_id, amount, period, alert_threshold_pct, created_at, updated_at";

pub struct Budgets<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Budgets<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create a budget. Re-posting a name updates the existing budget and keeps its ID.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), name = %request.name), err)]
    pub async fn create(&mut self, request: &BudgetCreateDBRequest) -> Result<BudgetDBResponse> {
        let query = format!(
            r#"
            INSERT INTO gcp_budgets (id, user_id, name, project_id, amount, period, alert_threshold_pct)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, name) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                amount = EXCLUDED.amount,
                period = EXCLUDED.period,
                alert_threshold_pct = EXCLUDED.alert_threshold_pct,
                updated_at = NOW()
            RETURNING {BUDGET_COLUMNS}
            "#
        );
        let budget = sqlx::query_as::<_, BudgetDBResponse>(&query)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(&request.name)
            .bind(&request.project_id)
            .bind(request.amount)
            .bind(request.period)
            .bind(request.alert_threshold_pct)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(budget)
    }

    #[instrument(skip(self), fields(id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, user_id: UserId, id: BudgetId) -> Result<Option<BudgetDBResponse>> {
        let query = format!("SELECT {BUDGET_COLUMNS} FROM gcp_budgets WHERE user_id = $1 AND id = $2");
        let budget = sqlx::query_as::<_, BudgetDBResponse>(&query)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(budget)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<BudgetDBResponse>> {
        let query = format!("SELECT {BUDGET_COLUMNS} FROM gcp_budgets WHERE user_id = $1 ORDER BY name");
        let budgets = sqlx::query_as::<_, BudgetDBResponse>(&query)
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(budgets)
    }

    #[instrument(skip(self, request), fields(id = %abbrev_uuid(&id)), err)]
    pub async fn update(
        &mut self,
        user_id: UserId,
        id: BudgetId,
        request: &BudgetUpdateDBRequest,
    ) -> Result<Option<BudgetDBResponse>> {
        let query = format!(
            r#"
            UPDATE gcp_budgets SET
                name = COALESCE($3, name),
                project_id = CASE WHEN $4 THEN $5 ELSE project_id END,
                amount = COALESCE($6, amount),
                alert_threshold_pct = COALESCE($7, alert_threshold_pct),
                updated_at = NOW()
            WHERE user_id = $1 AND id = $2
            RETURNING {BUDGET_COLUMNS}
            "#
        );
        let budget = sqlx::query_as::<_, BudgetDBResponse>(&query)
            .bind(user_id)
            .bind(id)
            .bind(&request.name)
            .bind(request.project_id.is_some())
            .bind(request.project_id.clone().flatten())
            .bind(request.amount)
            .bind(request.alert_threshold_pct)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(budget)
    }

    #[instrument(skip(self), fields(id = %abbrev_uuid(&id)), err)]
    pub async fn delete(&mut self, user_id: UserId, id: BudgetId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gcp_budgets WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

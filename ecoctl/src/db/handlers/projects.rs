//! Database repositories for projects and billing accounts.

use crate::{
    db::{
        errors::Result,
        models::projects::{
            BillingAccountDBResponse, BillingAccountUpsertDBRequest, ProjectDBResponse, ProjectUpsertDBRequest,
        },
    },
    types::{UserId, abbrev_uuid},
};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Projects<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Projects<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(project_id = %request.project_id), err)]
    pub async fn upsert(&mut self, request: &ProjectUpsertDBRequest) -> Result<ProjectDBResponse> {
        let project = sqlx::query_as::<_, ProjectDBResponse>(
            r#"
            INSERT INTO gcp_projects (
                user_id, project_id, name, project_number, lifecycle_state,
                billing_account_id, billing_enabled, current_month_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, project_id) DO UPDATE SET
                name = EXCLUDED.name,
                project_number = EXCLUDED.project_number,
                lifecycle_state = EXCLUDED.lifecycle_state,
                billing_account_id = EXCLUDED.billing_account_id,
                billing_enabled = EXCLUDED.billing_enabled,
                current_month_cost = EXCLUDED.current_month_cost,
                updated_at = NOW()
            RETURNING user_id, project_id, name, project_number, lifecycle_state,
                      billing_account_id, billing_enabled, current_month_cost, updated_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.project_id)
        .bind(&request.name)
        .bind(&request.project_number)
        .bind(&request.lifecycle_state)
        .bind(&request.billing_account_id)
        .bind(request.billing_enabled)
        .bind(request.current_month_cost)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(project)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<ProjectDBResponse>> {
        let projects = sqlx::query_as::<_, ProjectDBResponse>(
            r#"
            SELECT user_id, project_id, name, project_number, lifecycle_state,
                   billing_account_id, billing_enabled, current_month_cost, updated_at
            FROM gcp_projects
            WHERE user_id = $1
            ORDER BY project_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(projects)
    }
}

pub struct BillingAccounts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> BillingAccounts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(billing_account_id = %request.billing_account_id), err)]
    pub async fn upsert(&mut self, request: &BillingAccountUpsertDBRequest) -> Result<BillingAccountDBResponse> {
        let account = sqlx::query_as::<_, BillingAccountDBResponse>(
            r#"
            INSERT INTO gcp_billing_accounts (user_id, billing_account_id, display_name, open, master_billing_account)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, billing_account_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                open = EXCLUDED.open,
                master_billing_account = EXCLUDED.master_billing_account,
                updated_at = NOW()
            RETURNING user_id, billing_account_id, display_name, open, master_billing_account, updated_at
            "#,
        )
        .bind(request.user_id)
        .bind(&request.billing_account_id)
        .bind(&request.display_name)
        .bind(request.open)
        .bind(&request.master_billing_account)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(account)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let accounts = sqlx::query_as::<_, BillingAccountDBResponse>(
            r#"
            SELECT user_id, billing_account_id, display_name, open, master_billing_account, updated_at
            FROM gcp_billing_accounts
            WHERE user_id = $1
            ORDER BY billing_account_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(accounts)
    }
}

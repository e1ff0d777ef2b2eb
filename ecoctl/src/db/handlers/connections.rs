//! Database repository for Google Cloud connections.

use crate::{
    db::{
        errors::Result,
        models::connections::{ConnectionDBResponse, ConnectionUpsertDBRequest, SyncOutcome},
    },
    types::{UserId, abbrev_uuid},
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

const CONNECTION_COLUMNS: &str = "user_id, google_account_id, google_email, access_token, refresh_token, token_expires_at, \
     scopes, status, last_sync_at, last_error, created_at, updated_at";

pub struct Connections<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Connections<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create or replace the user's connection. Reconnecting resets the status and error.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn upsert(&mut self, request: &ConnectionUpsertDBRequest) -> Result<ConnectionDBResponse> {
        let query = format!(
            r#"
            INSERT INTO gcp_connections (
                user_id, google_account_id, google_email, access_token, refresh_token, token_expires_at, scopes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            ON CONFLICT (user_id) DO UPDATE SET
                google_account_id = EXCLUDED.google_account_id,
                google_email = EXCLUDED.google_email,
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, gcp_connections.refresh_token),
                token_expires_at = EXCLUDED.token_expires_at,
                scopes = EXCLUDED.scopes,
                status = 'active',
                last_error = NULL,
                updated_at = NOW()
            RETURNING {CONNECTION_COLUMNS}
            "#
        );
        let connection = sqlx::query_as::<_, ConnectionDBResponse>(&query)
            .bind(request.user_id)
            .bind(&request.google_account_id)
            .bind(&request.google_email)
            .bind(&request.access_token)
            .bind(&request.refresh_token)
            .bind(request.token_expires_at)
            .bind(&request.scopes)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(connection)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get(&mut self, user_id: UserId) -> Result<Option<ConnectionDBResponse>> {
        let query = format!("SELECT {CONNECTION_COLUMNS} FROM gcp_connections WHERE user_id = $1");
        let connection = sqlx::query_as::<_, ConnectionDBResponse>(&query)
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(connection)
    }

    #[instrument(skip(self, access_token, refresh_token), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn update_tokens(
        &mut self,
        user_id: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE gcp_connections
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                token_expires_at = $4,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, outcome), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn record_sync(&mut self, user_id: UserId, outcome: &SyncOutcome) -> Result<()> {
        match outcome {
            SyncOutcome::Succeeded => {
                sqlx::query(
                    r#"
                    UPDATE gcp_connections
                    SET last_sync_at = NOW(), last_error = NULL, status = 'active', updated_at = NOW()
                    WHERE user_id = $1 AND status <> 'disconnected'
                    "#,
                )
                .bind(user_id)
                .execute(&mut *self.db)
                .await?;
            }
            SyncOutcome::Failed(message) => {
                sqlx::query(
                    r#"
                    UPDATE gcp_connections
                    SET last_error = $2, status = 'error', updated_at = NOW()
                    WHERE user_id = $1 AND status <> 'disconnected'
                    "#,
                )
                .bind(user_id)
                .bind(message)
                .execute(&mut *self.db)
                .await?;
            }
        }

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn disconnect(&mut self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE gcp_connections
            SET status = 'disconnected', access_token = NULL, refresh_token = NULL,
                token_expires_at = NULL, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

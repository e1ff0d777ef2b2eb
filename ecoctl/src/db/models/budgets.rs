//! Database models for budgets.

use crate::types::{BudgetId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    #[default]
    Monthly,
}

/// Database request for creating a budget. A budget with the same name is replaced.
#[derive(Debug, Clone)]
pub struct BudgetCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub project_id: Option<String>,
    pub amount: Decimal,
    pub period: BudgetPeriod,
    pub alert_threshold_pct: f64,
}

/// Database request for updating a budget. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BudgetUpdateDBRequest {
    pub name: Option<String>,
    /// `Some(None)` widens the budget to all projects
    pub project_id: Option<Option<String>>,
    pub amount: Option<Decimal>,
    pub alert_threshold_pct: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BudgetDBResponse {
    pub id: BudgetId,
    pub user_id: UserId,
    pub name: String,
    pub project_id: Option<String>,
    pub amount: Decimal,
    pub period: BudgetPeriod,
    pub alert_threshold_pct: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

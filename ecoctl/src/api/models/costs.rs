use crate::db::models::{
    costs::ServiceUsageDBResponse,
    projects::{BillingAccountDBResponse, ProjectDBResponse},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub project_id: String,
    pub name: Option<String>,
    pub project_number: Option<String>,
    pub lifecycle_state: Option<String>,
    pub billing_account_id: Option<String>,
    pub billing_enabled: bool,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub current_month_cost: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectDBResponse> for ProjectResponse {
    fn from(p: ProjectDBResponse) -> Self {
        Self {
            project_id: p.project_id,
            name: p.name,
            project_number: p.project_number,
            lifecycle_state: p.lifecycle_state,
            billing_account_id: p.billing_account_id,
            billing_enabled: p.billing_enabled,
            current_month_cost: p.current_month_cost,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BillingAccountResponse {
    pub billing_account_id: String,
    pub display_name: String,
    pub open: bool,
    pub master_billing_account: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<BillingAccountDBResponse> for BillingAccountResponse {
    fn from(a: BillingAccountDBResponse) -> Self {
        Self {
            billing_account_id: a.billing_account_id,
            display_name: a.display_name,
            open: a.open,
            master_billing_account: a.master_billing_account,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceUsageResponse {
    pub project_id: String,
    pub service_id: String,
    pub service_name: String,
    pub period_start: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cost: Decimal,
    /// Fraction of the project's cost attributed to the service
    pub share: f64,
}

impl From<ServiceUsageDBResponse> for ServiceUsageResponse {
    fn from(u: ServiceUsageDBResponse) -> Self {
        Self {
            project_id: u.project_id,
            service_id: u.service_id,
            service_name: u.service_name,
            period_start: u.period_start,
            cost: u.cost,
            share: u.share,
        }
    }
}

/// Query for listing service costs
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ServiceUsageQuery {
    /// Billing period (first day of the month); defaults to every period
    pub period_start: Option<NaiveDate>,
    /// Only this project
    pub project_id: Option<String>,
}

/// Result of `POST /api/gcp/sync-costs`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CostSyncReport {
    pub projects_synced: usize,
    pub billing_accounts_synced: usize,
    pub services_synced: usize,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_cost: Decimal,
    /// Steps that failed; earlier writes are kept
    pub errors: Vec<String>,
}

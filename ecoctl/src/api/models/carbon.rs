use crate::db::models::carbon::{CarbonDBResponse, CarbonSource};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CarbonResponse {
    pub project_id: String,
    pub period_start: NaiveDate,
    pub region: String,
    pub energy_kwh: f64,
    pub carbon_kg: f64,
    pub source: CarbonSource,
}

impl From<CarbonDBResponse> for CarbonResponse {
    fn from(c: CarbonDBResponse) -> Self {
        Self {
            project_id: c.project_id,
            period_start: c.period_start,
            region: c.region,
            energy_kwh: c.energy_kwh,
            carbon_kg: c.carbon_kg,
            source: c.source,
        }
    }
}

/// Query for listing carbon rows
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct CarbonQuery {
    /// Billing period (first day of the month); defaults to every period
    pub period_start: Option<NaiveDate>,
}

/// Result of `POST /api/gcp/sync-carbon`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CarbonSyncReport {
    pub projects_synced: usize,
    pub total_energy_kwh: f64,
    pub total_carbon_kg: f64,
    pub source: CarbonSource,
    pub errors: Vec<String>,
}

//! Carbon footprint sync.
//!
//! Prefers Google's Carbon Footprint export when one is configured. Otherwise each project's
//! energy is estimated from its service costs and converted to emissions with the grid intensity
//! of the configured default region.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, instrument, warn};

use super::{parse_decimal, period_start, round_f64, usable_connection};
use crate::{
    AppState,
    api::models::carbon::CarbonSyncReport,
    config::is_valid_table_reference,
    db::models::{
        carbon::{CarbonSource, CarbonUpsertDBRequest},
        costs::ServiceUsageDBResponse,
    },
    errors::Result,
    gcp::{QueryResult, oauth},
    types::{UserId, abbrev_uuid},
};

/// Grid intensity used for regions missing from [`GRID_INTENSITY`], in kgCO2e/kWh
pub const DEFAULT_GRID_INTENSITY: f64 = 0.4;

/// Location-based grid carbon intensity of common GCP regions, in kgCO2e/kWh
pub const GRID_INTENSITY: [(&str, f64); 18] = [
    ("us-central1", 0.413),
    ("us-east1", 0.560),
    ("us-east4", 0.361),
    ("us-west1", 0.079),
    ("us-west2", 0.169),
    ("us-west4", 0.357),
    ("northamerica-northeast1", 0.0017),
    ("southamerica-east1", 0.074),
    ("europe-north1", 0.088),
    ("europe-west1", 0.103),
    ("europe-west2", 0.172),
    ("europe-west3", 0.276),
    ("europe-west4", 0.209),
    ("europe-west6", 0.011),
    ("asia-east1", 0.456),
    ("asia-northeast1", 0.463),
    ("asia-south1", 0.670),
    ("australia-southeast1", 0.598),
];

/// Energy drawn per dollar spent on a service, in kWh/USD
pub fn kwh_per_usd(service_name: &str) -> f64 {
    match service_name {
        "Compute Engine" => 1.8,
        "Cloud SQL" => 1.2,
        "BigQuery" => 0.9,
        "Cloud Functions" => 0.7,
        "Cloud Storage" => 0.4,
        "Networking" => 0.3,
        _ => 0.5,
    }
}

pub fn grid_intensity(region: &str) -> f64 {
    GRID_INTENSITY
        .iter()
        .find(|(name, _)| *name == region)
        .map_or(DEFAULT_GRID_INTENSITY, |(_, intensity)| *intensity)
}

/// Energy (kWh) and emissions (kgCO2e) of one project's services in `region`
pub fn estimate(usage: &[&ServiceUsageDBResponse], region: &str) -> (f64, f64) {
    let energy_kwh: f64 = usage
        .iter()
        .map(|u| u.cost.to_f64().unwrap_or(0.0) * kwh_per_usd(&u.service_name))
        .sum();
    let carbon_kg = energy_kwh * grid_intensity(region);
    (round_f64(energy_kwh, 4), round_f64(carbon_kg, 4))
}

/// Per-project emissions for one month of the Carbon Footprint export
pub fn carbon_export_query(table: &str, month: NaiveDate) -> String {
    format!(
        "SELECT project.id AS project_id, \
         ANY_VALUE(location.region) AS region, \
         SUM(carbon_footprint_total_kgCO2e.location_based) AS carbon_kg \
         FROM `{table}` \
         WHERE usage_month = '{month}' \
         GROUP BY project_id ORDER BY project_id"
    )
}

/// One project's figures parsed from the export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFootprint {
    pub project_id: String,
    pub region: String,
    pub carbon_kg: f64,
}

pub fn parse_carbon_export(result: &QueryResult, default_region: &str) -> std::result::Result<Vec<ExportedFootprint>, String> {
    let project_col = result.column("project_id").ok_or("carbon export result has no `project_id` column")?;
    let carbon_col = result.column("carbon_kg").ok_or("carbon export result has no `carbon_kg` column")?;
    let region_col = result.column("region");

    let mut rows = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let Some(project_id) = row.get(project_col).and_then(Option::as_deref) else {
            continue;
        };
        let carbon_kg = match row.get(carbon_col).and_then(Option::as_deref) {
            Some(cell) => parse_decimal(cell)
                .and_then(|d| d.to_f64())
                .ok_or_else(|| format!("bad carbon value `{cell}` for {project_id}"))?,
            None => 0.0,
        };
        let region = region_col
            .and_then(|i| row.get(i))
            .and_then(Option::as_deref)
            .filter(|r| !r.is_empty())
            .unwrap_or(default_region);
        rows.push(ExportedFootprint {
            project_id: project_id.to_string(),
            region: region.to_string(),
            carbon_kg,
        });
    }
    Ok(rows)
}

async fn fetch_export(state: &AppState, user_id: UserId, table: &str, month: NaiveDate) -> std::result::Result<Vec<ExportedFootprint>, String> {
    if !is_valid_table_reference(table) {
        return Err(format!("carbon export table `{table}` is not a valid table reference"));
    }
    let connection = usable_connection(state, user_id).await.map_err(|e| e.user_message())?;
    let access_token = oauth::fresh_access_token(state.store.as_ref(), state.gcp.as_ref(), &state.cipher, &connection)
        .await
        .map_err(|e| e.user_message())?;
    let project = table.split('.').next().unwrap_or(table);
    let result = state
        .gcp
        .run_query(&access_token, project, &carbon_export_query(table, month))
        .await
        .map_err(|e| format!("carbon export query failed: {e}"))?;
    parse_carbon_export(&result, &state.config.gcp.default_region)
}

/// Sync this month's carbon footprint for the user's projects.
#[instrument(skip(state), fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn sync_carbon(state: &AppState, user_id: UserId, today: NaiveDate) -> Result<CarbonSyncReport> {
    usable_connection(state, user_id).await?;
    let period = period_start(today);
    let mut errors = Vec::new();

    if let Some(table) = state.config.gcp.carbon_export_table.as_deref() {
        match fetch_export(state, user_id, table, period).await {
            Ok(rows) if !rows.is_empty() => {
                let mut report = CarbonSyncReport {
                    projects_synced: 0,
                    total_energy_kwh: 0.0,
                    total_carbon_kg: 0.0,
                    source: CarbonSource::Export,
                    errors,
                };
                for row in rows {
                    let energy_kwh = round_f64(row.carbon_kg / grid_intensity(&row.region), 4);
                    state
                        .store
                        .upsert_carbon(&CarbonUpsertDBRequest {
                            user_id,
                            project_id: row.project_id,
                            period_start: period,
                            region: row.region,
                            energy_kwh,
                            carbon_kg: round_f64(row.carbon_kg, 4),
                            source: CarbonSource::Export,
                        })
                        .await?;
                    report.projects_synced += 1;
                    report.total_energy_kwh += energy_kwh;
                    report.total_carbon_kg += row.carbon_kg;
                }
                report.total_energy_kwh = round_f64(report.total_energy_kwh, 4);
                report.total_carbon_kg = round_f64(report.total_carbon_kg, 4);
                metrics::counter!("ecoctl_syncs_total", "kind" => "carbon", "outcome" => "export").increment(1);
                info!("Carbon sync from export: {} projects", report.projects_synced);
                return Ok(report);
            }
            Ok(_) => {
                info!("Carbon export has no rows for {}, estimating instead", period);
            }
            Err(message) => {
                warn!("{}", message);
                errors.push(format!("{message}; using estimates"));
            }
        }
    }

    let usage = state.store.list_service_usage(user_id, Some(period)).await?;
    let mut by_project: BTreeMap<&str, Vec<&ServiceUsageDBResponse>> = BTreeMap::new();
    for row in &usage {
        by_project.entry(row.project_id.as_str()).or_default().push(row);
    }

    let region = state.config.gcp.default_region.as_str();
    let mut report = CarbonSyncReport {
        projects_synced: 0,
        total_energy_kwh: 0.0,
        total_carbon_kg: 0.0,
        source: CarbonSource::Estimate,
        errors,
    };
    if by_project.is_empty() {
        report.errors.push("no service costs for this month; run a cost sync first".to_string());
    }
    for (project_id, rows) in by_project {
        let (energy_kwh, carbon_kg) = estimate(&rows, region);
        state
            .store
            .upsert_carbon(&CarbonUpsertDBRequest {
                user_id,
                project_id: project_id.to_string(),
                period_start: period,
                region: region.to_string(),
                energy_kwh,
                carbon_kg,
                source: CarbonSource::Estimate,
            })
            .await?;
        report.projects_synced += 1;
        report.total_energy_kwh += energy_kwh;
        report.total_carbon_kg += carbon_kg;
    }
    report.total_energy_kwh = round_f64(report.total_energy_kwh, 4);
    report.total_carbon_kg = round_f64(report.total_carbon_kg, 4);

    metrics::counter!("ecoctl_syncs_total", "kind" => "carbon", "outcome" => "estimate").increment(1);
    info!("Carbon sync estimated {} projects", report.projects_synced);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn usage(service_name: &str, cost: i64) -> ServiceUsageDBResponse {
        ServiceUsageDBResponse {
            user_id: Uuid::nil(),
            project_id: "alpha".to_string(),
            service_id: "x".to_string(),
            service_name: service_name.to_string(),
            period_start: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            cost: Decimal::new(cost, 0),
            share: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_grid_intensity_fallback() {
        assert_eq!(grid_intensity("europe-west1"), 0.103);
        assert_eq!(grid_intensity("mars-north1"), DEFAULT_GRID_INTENSITY);
    }

    #[test]
    fn test_estimate() {
        let compute = usage("Compute Engine", 100);
        let storage = usage("Cloud Storage", 50);
        // 100 * 1.8 + 50 * 0.4 = 200 kWh, at the fallback 0.4 kg/kWh
        let (energy, carbon) = estimate(&[&compute, &storage], "unknown-region");
        assert_eq!(energy, 200.0);
        assert_eq!(carbon, 80.0);
    }

    #[test]
    fn test_estimate_with_no_usage() {
        assert_eq!(estimate(&[], "us-central1"), (0.0, 0.0));
    }

    #[test]
    fn test_carbon_export_query() {
        let sql = carbon_export_query("p.carbon.footprint", NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert!(sql.contains("carbon_footprint_total_kgCO2e"));
        assert!(sql.contains("usage_month = '2026-10-01'"));
    }

    #[test]
    fn test_parse_carbon_export() {
        let result = QueryResult {
            columns: vec!["project_id".to_string(), "region".to_string(), "carbon_kg".to_string()],
            rows: vec![
                vec![Some("alpha".to_string()), Some("europe-west1".to_string()), Some("12.5".to_string())],
                vec![Some("beta".to_string()), None, Some("1.0E1".to_string())],
                vec![None, None, Some("3".to_string())],
            ],
        };
        let rows = parse_carbon_export(&result, "us-central1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].carbon_kg, 12.5);
        assert_eq!(rows[1].region, "us-central1");
        assert_eq!(rows[1].carbon_kg, 10.0);
    }
}

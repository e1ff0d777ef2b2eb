//! Billing, project and cost sync.
//!
//! Google only exposes spend per billing account through the BigQuery billing export, so the
//! month's total is spread evenly over the user's active projects and each project's share is
//! split across services with fixed weights.

use chrono::NaiveDate;
use futures::{StreamExt, stream};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::{parse_decimal, period_start, usable_connection};
use crate::{
    AppState,
    api::models::costs::CostSyncReport,
    config::is_valid_table_reference,
    db::models::{
        connections::SyncOutcome,
        costs::{CostHistoryEntry, ServiceUsageUpsertDBRequest},
        projects::{BillingAccountUpsertDBRequest, ProjectUpsertDBRequest},
    },
    errors::{Error, Result},
    gcp::{GcpError, GcpProject, ProjectBillingInfo, QueryResult, oauth},
    types::{UserId, abbrev_uuid},
};

/// Billing info lookups in flight at once
const BILLING_INFO_CONCURRENCY: usize = 8;

/// A service's fixed share of a project's cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceShare {
    /// Cloud Billing catalog service ID
    pub service_id: &'static str,
    pub service_name: &'static str,
    /// Whole percent of the project's cost
    pub percent: u32,
}

impl ServiceShare {
    pub fn fraction(&self) -> Decimal {
        Decimal::new(i64::from(self.percent), 2)
    }
}

/// Fixed service split; the percentages add up to 100.
pub const SERVICE_SPLIT: [ServiceShare; 6] = [
    ServiceShare {
        service_id: "6F81-5844-456A",
        service_name: "Compute Engine",
        percent: 40,
    },
    ServiceShare {
        service_id: "95FF-2EF5-5EA1",
        service_name: "Cloud Storage",
        percent: 20,
    },
    ServiceShare {
        service_id: "24E6-581D-38E5",
        service_name: "BigQuery",
        percent: 15,
    },
    ServiceShare {
        service_id: "9662-B51E-5089",
        service_name: "Cloud SQL",
        percent: 10,
    },
    ServiceShare {
        service_id: "E505-1604-58F8",
        service_name: "Networking",
        percent: 10,
    },
    ServiceShare {
        service_id: "29E7-DA93-CA13",
        service_name: "Cloud Functions",
        percent: 5,
    },
];

/// Money values are kept to this many decimal places
pub const MONEY_DP: u32 = 4;

/// Share of `total` for each of `parts` projects. Zero when there are no projects.
pub fn split_evenly(total: Decimal, parts: usize) -> Decimal {
    if parts == 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(parts)).round_dp(MONEY_DP)
}

/// Split one project's cost across [`SERVICE_SPLIT`]
pub fn split_by_service(project_cost: Decimal) -> Vec<(ServiceShare, Decimal)> {
    SERVICE_SPLIT
        .iter()
        .map(|share| (*share, (project_cost * share.fraction()).round_dp(MONEY_DP)))
        .collect()
}

/// Daily totals from the billing export between `from` and `to` inclusive, credits applied
pub fn billing_export_query(table: &str, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "SELECT FORMAT_DATE('%Y-%m-%d', DATE(usage_start_time)) AS day, \
         SUM(cost) + SUM(IFNULL((SELECT SUM(c.amount) FROM UNNEST(credits) c), 0)) AS cost \
         FROM `{table}` \
         WHERE DATE(usage_start_time) BETWEEN '{from}' AND '{to}' \
         GROUP BY day ORDER BY day"
    )
}

/// Turn a `day, cost` result into typed rows
pub fn parse_daily_costs(result: &QueryResult) -> std::result::Result<Vec<(NaiveDate, Decimal)>, String> {
    let day_col = result.column("day").ok_or("billing export result has no `day` column")?;
    let cost_col = result.column("cost").ok_or("billing export result has no `cost` column")?;

    result
        .rows
        .iter()
        .map(|row| -> std::result::Result<(NaiveDate, Decimal), String> {
            let day = row
                .get(day_col)
                .and_then(Option::as_deref)
                .ok_or("billing export row without a day")?;
            let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| format!("bad day `{day}`: {e}"))?;
            let cost = match row.get(cost_col).and_then(Option::as_deref) {
                Some(cell) => parse_decimal(cell).ok_or_else(|| format!("bad cost `{cell}` on {day}"))?,
                None => Decimal::ZERO,
            };
            Ok((day, cost.round_dp(6)))
        })
        .collect()
}

/// The project that owns a `project.dataset.table` reference; queries are billed to it
fn table_project(table: &str) -> &str {
    table.split('.').next().unwrap_or(table)
}

/// Query the current month's daily totals. Errors are returned as messages for the report.
async fn fetch_daily_costs(
    state: &AppState,
    access_token: &str,
    today: NaiveDate,
) -> std::result::Result<Vec<(NaiveDate, Decimal)>, String> {
    let table = state
        .config
        .gcp
        .billing_export_table
        .as_deref()
        .ok_or("billing export table is not configured; total cost recorded as 0")?;
    if !is_valid_table_reference(table) {
        return Err(format!("billing export table `{table}` is not a valid table reference"));
    }

    let sql = billing_export_query(table, period_start(today), today);
    let result = state
        .gcp
        .run_query(access_token, table_project(table), &sql)
        .await
        .map_err(|e| format!("billing export query failed: {e}"))?;
    parse_daily_costs(&result)
}

async fn fail_sync(state: &AppState, user_id: UserId, error: GcpError) -> Error {
    if let Err(e) = state.store.record_sync(user_id, &SyncOutcome::Failed(error.to_string())).await {
        warn!("Failed to record sync failure: {}", e);
    }
    Error::Upstream(error)
}

fn project_ids_of(projects: &[GcpProject]) -> Vec<String> {
    projects.iter().map(|p| p.project_id.clone()).collect()
}

/// Sync billing accounts, projects and this month's costs for the user.
#[instrument(skip(state), fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn sync_costs(state: &AppState, user_id: UserId, today: NaiveDate) -> Result<CostSyncReport> {
    let connection = usable_connection(state, user_id).await?;
    let access_token = oauth::fresh_access_token(state.store.as_ref(), state.gcp.as_ref(), &state.cipher, &connection).await?;

    let mut errors = Vec::new();
    let mut listings_failed = 0;

    let mut billing_accounts_synced = 0;
    match state.gcp.list_billing_accounts(&access_token).await {
        Ok(accounts) => {
            for account in &accounts {
                state
                    .store
                    .upsert_billing_account(&BillingAccountUpsertDBRequest {
                        user_id,
                        billing_account_id: account.account_id().to_string(),
                        display_name: account.display_name.clone(),
                        open: account.open,
                        master_billing_account: account.master_billing_account.clone(),
                    })
                    .await?;
                billing_accounts_synced += 1;
            }
        }
        Err(e @ GcpError::Unauthorized { .. }) => return Err(fail_sync(state, user_id, e).await),
        Err(e) => {
            warn!("Listing billing accounts failed: {}", e);
            errors.push(format!("billing accounts: {e}"));
            listings_failed += 1;
        }
    }

    let (projects, projects_listed): (Vec<GcpProject>, bool) = match state.gcp.list_projects(&access_token).await {
        Ok(projects) => (projects.into_iter().filter(|p| p.is_active()).collect(), true),
        Err(e @ GcpError::Unauthorized { .. }) => return Err(fail_sync(state, user_id, e).await),
        Err(e) => {
            warn!("Listing projects failed: {}", e);
            errors.push(format!("projects: {e}"));
            listings_failed += 1;
            (Vec::new(), false)
        }
    };

    let gcp = state.gcp.clone();
    let token = access_token.clone();
    let lookups: Vec<_> = stream::iter(project_ids_of(&projects))
        .map(move |project_id| {
            let gcp = gcp.clone();
            let access_token = token.clone();
            async move { gcp.project_billing_info(&access_token, &project_id).await }
        })
        .buffered(BILLING_INFO_CONCURRENCY)
        .collect()
        .await;
    let mut billing = Vec::with_capacity(projects.len());
    for (project, lookup) in projects.iter().zip(lookups) {
        match lookup {
            Ok(info) => billing.push(info),
            Err(e) => {
                warn!("Billing info for {} failed: {}", project.project_id, e);
                errors.push(format!("billing info for {}: {e}", project.project_id));
                billing.push(ProjectBillingInfo::default());
            }
        }
    }

    let daily = fetch_daily_costs(state, &access_token, today).await.unwrap_or_else(|message| {
        warn!("{}", message);
        errors.push(message);
        Vec::new()
    });
    let total_cost: Decimal = daily.iter().map(|(_, cost)| *cost).sum();
    let per_project = split_evenly(total_cost, projects.len());
    let period = period_start(today);

    let mut services_synced = 0;
    for (project, info) in projects.iter().zip(&billing) {
        state
            .store
            .upsert_project(&ProjectUpsertDBRequest {
                user_id,
                project_id: project.project_id.clone(),
                name: project.name.clone(),
                project_number: project.project_number.clone(),
                lifecycle_state: project.lifecycle_state.clone(),
                billing_account_id: info.billing_account_id().map(str::to_string),
                billing_enabled: info.billing_enabled,
                current_month_cost: per_project,
            })
            .await?;

        for (share, cost) in split_by_service(per_project) {
            state
                .store
                .upsert_service_usage(&ServiceUsageUpsertDBRequest {
                    user_id,
                    project_id: project.project_id.clone(),
                    service_id: share.service_id.to_string(),
                    service_name: share.service_name.to_string(),
                    period_start: period,
                    cost,
                    share: f64::from(share.percent) / 100.0,
                })
                .await?;
            services_synced += 1;
        }

        for (day, day_total) in &daily {
            state
                .store
                .upsert_cost_history(&CostHistoryEntry {
                    user_id,
                    project_id: project.project_id.clone(),
                    day: *day,
                    cost: split_evenly(*day_total, projects.len()),
                })
                .await?;
        }
    }

    // Projects gone from the listing would otherwise keep their old share of the total
    if projects_listed {
        let retired = state
            .store
            .retire_projects(user_id, &project_ids_of(&projects), period)
            .await?;
        if retired > 0 {
            info!("Retired {} projects no longer active", retired);
        }
    }

    let outcome = if listings_failed == 2 {
        SyncOutcome::Failed(errors.join("; "))
    } else {
        SyncOutcome::Succeeded
    };
    state.store.record_sync(user_id, &outcome).await?;

    let outcome_label = if matches!(outcome, SyncOutcome::Succeeded) { "success" } else { "failure" };
    metrics::counter!("ecoctl_syncs_total", "kind" => "costs", "outcome" => outcome_label).increment(1);
    info!(
        "Cost sync finished: {} projects, {} billing accounts, total {}, {} errors",
        projects.len(),
        billing_accounts_synced,
        total_cost,
        errors.len()
    );

    Ok(CostSyncReport {
        projects_synced: projects.len(),
        billing_accounts_synced,
        services_synced,
        total_cost,
        errors,
    })
}

//! Rule-based optimization recommendations.
//!
//! Rules look at one project's service costs and carbon footprint for the current billing period.
//! Each rule produces at most one recommendation per project, keyed by its type, so generating
//! twice updates the figures of existing recommendations and keeps their status.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tracing::{info, instrument};

use super::{carbon, period_start, round_f64};
use crate::{
    AppState,
    api::models::recommendations::{RecommendationReport, RecommendationResponse},
    db::models::{
        carbon::CarbonDBResponse,
        costs::ServiceUsageDBResponse,
        recommendations::{Priority, RecommendationUpsertDBRequest},
    },
    errors::Result,
    types::{UserId, abbrev_uuid},
};

/// Per-project inputs to the rules
#[derive(Debug, Clone, Default)]
pub struct ProjectFootprint {
    /// Service name to cost for the period
    pub service_costs: BTreeMap<String, Decimal>,
    pub carbon_kg: f64,
    pub region: Option<String>,
}

impl ProjectFootprint {
    fn cost_of(&self, service_name: &str) -> Decimal {
        self.service_costs.get(service_name).copied().unwrap_or_default()
    }
}

/// A recommendation produced by a rule, before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub recommendation_type: &'static str,
    pub title: String,
    pub description: String,
    pub estimated_monthly_savings: Decimal,
    pub estimated_carbon_reduction_kg: f64,
    pub priority: Priority,
}

/// A cost rule: when `service` costs at least `min_cost`, `savings_pct` of it can be saved
struct CostRule {
    recommendation_type: &'static str,
    service: &'static str,
    min_cost: i64,
    savings_pct: i64,
    /// Whether the saving also cuts energy use
    reduces_energy: bool,
    title: &'static str,
    advice: &'static str,
}

const COST_RULES: [CostRule; 4] = [
    CostRule {
        recommendation_type: "rightsize_compute",
        service: "Compute Engine",
        min_cost: 100,
        savings_pct: 25,
        reduces_energy: true,
        title: "Rightsize Compute Engine instances",
        advice: "Apply machine type recommendations to over-provisioned VMs and stop idle instances.",
    },
    CostRule {
        recommendation_type: "committed_use_discount",
        service: "Compute Engine",
        min_cost: 500,
        savings_pct: 20,
        reduces_energy: false,
        title: "Purchase committed use discounts",
        advice: "Cover steady-state Compute Engine usage with 1 or 3 year commitments.",
    },
    CostRule {
        recommendation_type: "storage_class_tiering",
        service: "Cloud Storage",
        min_cost: 50,
        savings_pct: 30,
        reduces_energy: true,
        title: "Move cold objects to cheaper storage classes",
        advice: "Add lifecycle rules moving rarely read objects to Nearline, Coldline or Archive.",
    },
    CostRule {
        recommendation_type: "bigquery_partitioning",
        service: "BigQuery",
        min_cost: 50,
        savings_pct: 20,
        reduces_energy: true,
        title: "Partition and cluster BigQuery tables",
        advice: "Partition large tables by date and cluster on filter columns to cut bytes scanned.",
    },
];

/// Projects emitting at least this much per month get a region recommendation
pub const LOW_CARBON_MIN_KG: f64 = 100.0;
/// Share of emissions avoided by moving to a low-carbon region
pub const LOW_CARBON_REDUCTION: f64 = 0.4;

pub fn savings_priority(savings: Decimal) -> Priority {
    if savings >= Decimal::from(100) {
        Priority::High
    } else if savings >= Decimal::from(25) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

pub fn carbon_priority(reduction_kg: f64) -> Priority {
    if reduction_kg >= 500.0 { Priority::High } else { Priority::Medium }
}

/// Apply every rule to one project
pub fn suggest(footprint: &ProjectFootprint, default_region: &str) -> Vec<Suggestion> {
    let region = footprint.region.as_deref().unwrap_or(default_region);
    let mut suggestions = Vec::new();

    for rule in &COST_RULES {
        let cost = footprint.cost_of(rule.service);
        if cost < Decimal::from(rule.min_cost) {
            continue;
        }
        let fraction = Decimal::new(rule.savings_pct, 2);
        let savings = (cost * fraction).round_dp(2);
        let carbon_reduction_kg = if rule.reduces_energy {
            let kwh = (cost * fraction).to_f64().unwrap_or(0.0) * carbon::kwh_per_usd(rule.service);
            round_f64(kwh * carbon::grid_intensity(region), 4)
        } else {
            0.0
        };
        suggestions.push(Suggestion {
            recommendation_type: rule.recommendation_type,
            title: rule.title.to_string(),
            description: format!(
                "{} spend is {} this month. {} Estimated saving: {}%.",
                rule.service,
                cost.round_dp(2),
                rule.advice,
                rule.savings_pct
            ),
            estimated_monthly_savings: savings,
            estimated_carbon_reduction_kg: carbon_reduction_kg,
            priority: savings_priority(savings),
        });
    }

    if footprint.carbon_kg >= LOW_CARBON_MIN_KG {
        let reduction = round_f64(footprint.carbon_kg * LOW_CARBON_REDUCTION, 4);
        suggestions.push(Suggestion {
            recommendation_type: "low_carbon_region",
            title: "Run workloads in a low-carbon region".to_string(),
            description: format!(
                "This project emitted {:.1} kgCO2e this month in {}. Moving flexible workloads to a \
                 region with a cleaner grid, such as europe-north1 or us-west1, could avoid about {:.1} kgCO2e.",
                footprint.carbon_kg, region, reduction
            ),
            estimated_monthly_savings: Decimal::ZERO,
            estimated_carbon_reduction_kg: reduction,
            priority: carbon_priority(reduction),
        });
    }

    suggestions
}

/// Group the period's usage and carbon rows by project
pub fn footprints(usage: &[ServiceUsageDBResponse], carbon: &[CarbonDBResponse]) -> BTreeMap<String, ProjectFootprint> {
    let mut by_project: BTreeMap<String, ProjectFootprint> = BTreeMap::new();
    for row in usage {
        *by_project
            .entry(row.project_id.clone())
            .or_default()
            .service_costs
            .entry(row.service_name.clone())
            .or_default() += row.cost;
    }
    for row in carbon {
        let footprint = by_project.entry(row.project_id.clone()).or_default();
        footprint.carbon_kg += row.carbon_kg;
        footprint.region = Some(row.region.clone());
    }
    by_project
}

/// Generate and store recommendations from this month's costs and carbon.
#[instrument(skip(state), fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn generate(state: &AppState, user_id: UserId, today: NaiveDate) -> Result<RecommendationReport> {
    let period = period_start(today);
    let usage = state.store.list_service_usage(user_id, Some(period)).await?;
    let carbon = state.store.list_carbon(user_id, Some(period)).await?;

    let mut recommendations = Vec::new();
    let mut total_estimated_savings = Decimal::ZERO;
    for (project_id, footprint) in footprints(&usage, &carbon) {
        for suggestion in suggest(&footprint, &state.config.gcp.default_region) {
            let stored = state
                .store
                .upsert_recommendation(&RecommendationUpsertDBRequest {
                    user_id,
                    project_id: project_id.clone(),
                    recommendation_type: suggestion.recommendation_type.to_string(),
                    title: suggestion.title,
                    description: suggestion.description,
                    estimated_monthly_savings: suggestion.estimated_monthly_savings,
                    estimated_carbon_reduction_kg: suggestion.estimated_carbon_reduction_kg,
                    priority: suggestion.priority,
                })
                .await?;
            total_estimated_savings += stored.estimated_monthly_savings;
            recommendations.push(RecommendationResponse::from(stored));
        }
    }

    let keep: Vec<_> = recommendations.iter().map(|r| r.id).collect();
    let retired = state.store.retire_open_recommendations(user_id, &keep).await?;

    info!("Generated {} recommendations, retired {}", recommendations.len(), retired);
    Ok(RecommendationReport {
        generated: recommendations.len(),
        retired,
        total_estimated_savings,
        recommendations,
    })
}

//! Cost anomaly detection over daily cost history.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tracing::{debug, info, instrument};

use super::round_f64;
use crate::{
    AppState,
    api::models::anomalies::{AnomalyDetectionReport, AnomalyResponse},
    config::AnomalyConfig,
    db::models::{
        anomalies::{AnomalyUpsertDBRequest, Severity},
        costs::CostHistoryEntry,
    },
    errors::Result,
    types::{UserId, abbrev_uuid},
};

pub fn severity_for(deviation_pct: f64) -> Severity {
    if deviation_pct >= 100.0 {
        Severity::High
    } else if deviation_pct >= 50.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// An anomalous day found in one project's history
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub day: NaiveDate,
    pub expected_cost: Decimal,
    pub actual_cost: Decimal,
    pub deviation_pct: f64,
    pub severity: Severity,
}

/// Outcome of evaluating one project's history
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Not enough baseline days, or a zero baseline
    Skipped,
    Normal,
    Anomalous(Finding),
}

/// Compare the latest day of a single project's history with the mean of the `window_days`
/// calendar days before it. Entries may be in any order.
pub fn evaluate(history: &[CostHistoryEntry], config: &AnomalyConfig) -> Evaluation {
    let Some(latest) = history.iter().max_by_key(|e| e.day) else {
        return Evaluation::Skipped;
    };
    let window_start = latest.day - Duration::days(i64::from(config.window_days));
    let baseline: Vec<f64> = history
        .iter()
        .filter(|e| e.day >= window_start && e.day < latest.day)
        .map(|e| e.cost.to_f64().unwrap_or(0.0))
        .collect();

    if baseline.is_empty() || baseline.len() < config.min_history_days as usize {
        return Evaluation::Skipped;
    }
    let mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
    if mean <= 0.0 {
        return Evaluation::Skipped;
    }

    let actual = latest.cost.to_f64().unwrap_or(0.0);
    if actual <= mean * (1.0 + config.threshold_pct / 100.0) {
        return Evaluation::Normal;
    }

    let deviation_pct = round_f64((actual - mean) / mean * 100.0, 2);
    Evaluation::Anomalous(Finding {
        day: latest.day,
        expected_cost: Decimal::from_f64_retain(mean)
            .map(|d| d.round_dp(4))
            .unwrap_or_default(),
        actual_cost: latest.cost,
        deviation_pct,
        severity: severity_for(deviation_pct),
    })
}

/// Run detection over every project with cost history and upsert what is found.
#[instrument(skip(state), fields(user_id = %abbrev_uuid(&user_id)))]
pub async fn detect_anomalies(state: &AppState, user_id: UserId) -> Result<AnomalyDetectionReport> {
    let history = state.store.list_cost_history(user_id).await?;
    let mut by_project: BTreeMap<&str, Vec<CostHistoryEntry>> = BTreeMap::new();
    for entry in &history {
        by_project.entry(entry.project_id.as_str()).or_default().push(entry.clone());
    }

    let mut report = AnomalyDetectionReport {
        projects_evaluated: 0,
        anomalies_detected: 0,
        anomalies: Vec::new(),
    };
    for (project_id, entries) in by_project {
        let finding = match evaluate(&entries, &state.config.anomalies) {
            Evaluation::Skipped => {
                debug!("Skipping {} with too little history", project_id);
                continue;
            }
            Evaluation::Normal => {
                report.projects_evaluated += 1;
                continue;
            }
            Evaluation::Anomalous(finding) => finding,
        };
        report.projects_evaluated += 1;

        let anomaly = state
            .store
            .upsert_anomaly(&AnomalyUpsertDBRequest {
                user_id,
                project_id: project_id.to_string(),
                day: finding.day,
                expected_cost: finding.expected_cost,
                actual_cost: finding.actual_cost,
                deviation_pct: finding.deviation_pct,
                severity: finding.severity,
            })
            .await?;
        report.anomalies.push(AnomalyResponse::from(anomaly));
    }
    report.anomalies_detected = report.anomalies.len();

    metrics::counter!("ecoctl_anomalies_detected_total").increment(report.anomalies_detected as u64);
    info!(
        "Evaluated {} projects, {} anomalies",
        report.projects_evaluated, report.anomalies_detected
    );
    Ok(report)
}

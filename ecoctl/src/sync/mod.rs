//! Sync and analysis logic.
//!
//! Each submodule pairs pure functions (cost splitting, carbon estimation, anomaly detection,
//! budget evaluation, recommendation rules) with the orchestration that the route handlers call.
//! Orchestration is a sequence of Google calls followed by upserts. A failed step is reported in
//! the result's `errors` and does not undo earlier writes.

pub mod anomalies;
pub mod budgets;
pub mod carbon;
pub mod costs;
pub mod recommendations;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{
    AppState,
    db::models::{connections::ConnectionDBResponse, projects::ProjectDBResponse},
    errors::{Error, Result},
    types::UserId,
};

/// First day of the month containing `today`; the key of the current billing period
pub fn period_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// Key of the billing period in progress
pub fn current_period() -> NaiveDate {
    period_start(Utc::now().date_naive())
}

/// A project's spend in the period starting at `period`. A project last synced in an earlier
/// month has spent nothing in this one yet.
pub fn period_cost(project: &ProjectDBResponse, period: NaiveDate) -> Decimal {
    if project.updated_at.date_naive() >= period {
        project.current_month_cost
    } else {
        Decimal::ZERO
    }
}

/// Parse a BigQuery numeric cell, which may use scientific notation
pub fn parse_decimal(cell: &str) -> Option<Decimal> {
    cell.parse::<Decimal>().or_else(|_| Decimal::from_scientific(cell)).ok()
}

pub(crate) fn round_f64(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// The caller's connection, if it can still be used for Google calls
pub async fn usable_connection(state: &AppState, user_id: UserId) -> Result<ConnectionDBResponse> {
    state
        .store
        .get_connection(user_id)
        .await?
        .filter(ConnectionDBResponse::is_usable)
        .ok_or(Error::NotConnected)
}

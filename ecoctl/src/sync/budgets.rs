//! Budget spend evaluation and validation.

use chrono::NaiveDate;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};

use super::{current_period, period_cost, round_f64};
use crate::{
    AppState,
    api::models::{
        anomalies::AnomalyResponse,
        budgets::{AlertsResponse, BudgetCreate, BudgetResponse, BudgetStatus, BudgetUpdate},
    },
    db::models::{
        anomalies::AnomalyStatus,
        budgets::{BudgetCreateDBRequest, BudgetDBResponse, BudgetUpdateDBRequest},
        projects::ProjectDBResponse,
    },
    errors::{Error, Result},
    types::UserId,
};

/// Spend in `period` over the projects a budget covers. A budget without a project covers all
/// of them.
pub fn budget_spend(project_id: Option<&str>, projects: &[ProjectDBResponse], period: NaiveDate) -> Decimal {
    projects
        .iter()
        .filter(|p| project_id.is_none_or(|id| p.project_id == id))
        .map(|p| period_cost(p, period))
        .sum()
}

/// Status from the exact spend and amount, never from the rounded percentage
pub fn budget_status(spend: Decimal, amount: Decimal, alert_threshold_pct: f64) -> BudgetStatus {
    if amount <= Decimal::ZERO {
        return BudgetStatus::OnTrack;
    }
    if spend >= amount {
        return BudgetStatus::Exceeded;
    }
    let threshold = Decimal::from_f64(alert_threshold_pct).unwrap_or(Decimal::ONE_HUNDRED);
    if spend * Decimal::ONE_HUNDRED >= amount * threshold {
        BudgetStatus::Warning
    } else {
        BudgetStatus::OnTrack
    }
}

pub fn evaluate(budget: BudgetDBResponse, projects: &[ProjectDBResponse], period: NaiveDate) -> BudgetResponse {
    let spend = budget_spend(budget.project_id.as_deref(), projects, period);
    let percent_used = if budget.amount > Decimal::ZERO {
        round_f64((spend / budget.amount).to_f64().unwrap_or(0.0) * 100.0, 2)
    } else {
        0.0
    };
    let status = budget_status(spend, budget.amount, budget.alert_threshold_pct);
    BudgetResponse::new(budget, spend, percent_used, status)
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Budget name must not be empty".to_string(),
        });
    }
    Ok(name.to_string())
}

fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Budget amount must be greater than 0".to_string(),
        });
    }
    Ok(amount)
}

fn validate_threshold(threshold: f64) -> Result<f64> {
    if !(threshold > 0.0 && threshold <= 100.0) {
        return Err(Error::BadRequest {
            message: "alert_threshold_pct must be greater than 0 and at most 100".to_string(),
        });
    }
    Ok(threshold)
}

/// Validate a create request and turn it into a database request for `user_id`
pub fn create_request(user_id: UserId, create: BudgetCreate) -> Result<BudgetCreateDBRequest> {
    Ok(BudgetCreateDBRequest {
        user_id,
        name: validate_name(&create.name)?,
        project_id: create.project_id.filter(|p| !p.is_empty()),
        amount: validate_amount(create.amount)?,
        period: create.period,
        alert_threshold_pct: validate_threshold(create.alert_threshold_pct)?,
    })
}

pub fn update_request(update: BudgetUpdate) -> Result<BudgetUpdateDBRequest> {
    Ok(BudgetUpdateDBRequest {
        name: update.name.as_deref().map(validate_name).transpose()?,
        project_id: update.project_id.map(|p| p.filter(|p| !p.is_empty())),
        amount: update.amount.map(validate_amount).transpose()?,
        alert_threshold_pct: update.alert_threshold_pct.map(validate_threshold).transpose()?,
    })
}

/// Every budget of the user with its current spend
pub async fn evaluate_all(state: &AppState, user_id: UserId) -> Result<Vec<BudgetResponse>> {
    let projects = state.store.list_projects(user_id).await?;
    let budgets = state.store.list_budgets(user_id).await?;
    let period = current_period();
    Ok(budgets.into_iter().map(|b| evaluate(b, &projects, period)).collect())
}

/// Budgets that need attention and open anomalies
pub async fn alerts(state: &AppState, user_id: UserId) -> Result<AlertsResponse> {
    let budgets = evaluate_all(state, user_id)
        .await?
        .into_iter()
        .filter(|b| b.status != BudgetStatus::OnTrack)
        .collect();
    let anomalies = state
        .store
        .list_anomalies(user_id, Some(AnomalyStatus::Open))
        .await?
        .into_iter()
        .map(AnomalyResponse::from)
        .collect();
    Ok(AlertsResponse { budgets, anomalies })
}

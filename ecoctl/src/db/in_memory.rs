//! In-memory store.
//!
//! Keeps every table in process memory behind one lock. Upserts honour the same natural keys and
//! list orderings as the Postgres store. Suitable for tests and local demos; data is lost on
//! restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    RowCounts, Store,
    errors::{DbError, Result},
    models::{
        anomalies::{AnomalyDBResponse, AnomalyStatus, AnomalyUpsertDBRequest},
        budgets::{BudgetCreateDBRequest, BudgetDBResponse, BudgetUpdateDBRequest},
        carbon::{CarbonDBResponse, CarbonUpsertDBRequest},
        connections::{ConnectionDBResponse, ConnectionStatus, ConnectionUpsertDBRequest, SyncOutcome},
        costs::{CostHistoryEntry, ServiceUsageDBResponse, ServiceUsageUpsertDBRequest},
        projects::{BillingAccountDBResponse, BillingAccountUpsertDBRequest, ProjectDBResponse, ProjectUpsertDBRequest},
        recommendations::{RecommendationDBResponse, RecommendationStatus, RecommendationUpsertDBRequest},
    },
};
use crate::types::{AnomalyId, BudgetId, RecommendationId, UserId};

#[derive(Default)]
struct Tables {
    connections: HashMap<UserId, ConnectionDBResponse>,
    projects: BTreeMap<(UserId, String), ProjectDBResponse>,
    billing_accounts: BTreeMap<(UserId, String), BillingAccountDBResponse>,
    service_usage: BTreeMap<(UserId, String, String, NaiveDate), ServiceUsageDBResponse>,
    cost_history: BTreeMap<(UserId, String, NaiveDate), CostHistoryEntry>,
    carbon: BTreeMap<(UserId, String, NaiveDate), CarbonDBResponse>,
    recommendations: Vec<RecommendationDBResponse>,
    anomalies: Vec<AnomalyDBResponse>,
    budgets: Vec<BudgetDBResponse>,
}

/// In-memory implementation of [`Store`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn budget_name_taken(name: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some("gcp_budgets_user_name".to_string()),
        message: format!("a budget named {name} already exists"),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn backend(&self) -> &'static str {
        "in_memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_connection(&self, request: &ConnectionUpsertDBRequest) -> Result<ConnectionDBResponse> {
        let now = Utc::now();
        let mut tables = self.tables.write();
        let previous = tables.connections.get(&request.user_id);
        let connection = ConnectionDBResponse {
            user_id: request.user_id,
            google_account_id: request.google_account_id.clone(),
            google_email: request.google_email.clone(),
            access_token: Some(request.access_token.clone()),
            refresh_token: request
                .refresh_token
                .clone()
                .or_else(|| previous.and_then(|c| c.refresh_token.clone())),
            token_expires_at: request.token_expires_at,
            scopes: request.scopes.clone(),
            status: ConnectionStatus::Active,
            last_sync_at: previous.and_then(|c| c.last_sync_at),
            last_error: None,
            created_at: previous.map_or(now, |c| c.created_at),
            updated_at: now,
        };
        tables.connections.insert(request.user_id, connection.clone());
        Ok(connection)
    }

    async fn get_connection(&self, user_id: UserId) -> Result<Option<ConnectionDBResponse>> {
        Ok(self.tables.read().connections.get(&user_id).cloned())
    }

    async fn update_connection_tokens(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(connection) = self.tables.write().connections.get_mut(&user_id) {
            connection.access_token = Some(access_token.to_string());
            if let Some(refresh_token) = refresh_token {
                connection.refresh_token = Some(refresh_token.to_string());
            }
            connection.token_expires_at = expires_at;
            connection.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_sync(&self, user_id: UserId, outcome: &SyncOutcome) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(connection) = tables
            .connections
            .get_mut(&user_id)
            .filter(|c| c.status != ConnectionStatus::Disconnected)
        else {
            return Ok(());
        };
        let now = Utc::now();
        match outcome {
            SyncOutcome::Succeeded => {
                connection.last_sync_at = Some(now);
                connection.last_error = None;
                connection.status = ConnectionStatus::Active;
            }
            SyncOutcome::Failed(message) => {
                connection.last_error = Some(message.clone());
                connection.status = ConnectionStatus::Error;
            }
        }
        connection.updated_at = now;
        Ok(())
    }

    async fn disconnect(&self, user_id: UserId) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(connection) = tables.connections.get_mut(&user_id) else {
            return Ok(false);
        };
        connection.status = ConnectionStatus::Disconnected;
        connection.access_token = None;
        connection.refresh_token = None;
        connection.token_expires_at = None;
        connection.updated_at = Utc::now();
        Ok(true)
    }

    async fn purge_user_data(&self, user_id: UserId) -> Result<u64> {
        let mut tables = self.tables.write();
        let before = count(&tables, user_id);
        tables.projects.retain(|(owner, _), _| *owner != user_id);
        tables.billing_accounts.retain(|(owner, _), _| *owner != user_id);
        tables.service_usage.retain(|(owner, ..), _| *owner != user_id);
        tables.cost_history.retain(|(owner, ..), _| *owner != user_id);
        tables.carbon.retain(|(owner, ..), _| *owner != user_id);
        tables.recommendations.retain(|r| r.user_id != user_id);
        tables.anomalies.retain(|a| a.user_id != user_id);
        tables.budgets.retain(|b| b.user_id != user_id);
        let deleted = before.projects
            + before.billing_accounts
            + before.service_usage
            + before.cost_history
            + before.carbon_footprint
            + before.recommendations
            + before.anomalies
            + before.budgets;
        Ok(u64::try_from(deleted).unwrap_or_default())
    }

    async fn upsert_project(&self, request: &ProjectUpsertDBRequest) -> Result<ProjectDBResponse> {
        let project = ProjectDBResponse {
            user_id: request.user_id,
            project_id: request.project_id.clone(),
            name: request.name.clone(),
            project_number: request.project_number.clone(),
            lifecycle_state: request.lifecycle_state.clone(),
            billing_account_id: request.billing_account_id.clone(),
            billing_enabled: request.billing_enabled,
            current_month_cost: request.current_month_cost,
            updated_at: Utc::now(),
        };
        self.tables
            .write()
            .projects
            .insert((request.user_id, request.project_id.clone()), project.clone());
        Ok(project)
    }

    async fn list_projects(&self, user_id: UserId) -> Result<Vec<ProjectDBResponse>> {
        let tables = self.tables.read();
        Ok(tables.projects.values().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn retire_projects(&self, user_id: UserId, active: &[String], period_start: NaiveDate) -> Result<u64> {
        let mut tables = self.tables.write();
        let is_retired = |owner: &UserId, project_id: &String| *owner == user_id && !active.contains(project_id);
        tables
            .service_usage
            .retain(|(owner, project_id, _, period), _| !(is_retired(owner, project_id) && *period == period_start));
        tables
            .carbon
            .retain(|(owner, project_id, period), _| !(is_retired(owner, project_id) && *period == period_start));
        let before = tables.projects.len();
        tables.projects.retain(|(owner, project_id), _| !is_retired(owner, project_id));
        Ok((before - tables.projects.len()) as u64)
    }

    async fn upsert_billing_account(&self, request: &BillingAccountUpsertDBRequest) -> Result<BillingAccountDBResponse> {
        let account = BillingAccountDBResponse {
            user_id: request.user_id,
            billing_account_id: request.billing_account_id.clone(),
            display_name: request.display_name.clone(),
            open: request.open,
            master_billing_account: request.master_billing_account.clone(),
            updated_at: Utc::now(),
        };
        self.tables
            .write()
            .billing_accounts
            .insert((request.user_id, request.billing_account_id.clone()), account.clone());
        Ok(account)
    }

    async fn list_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let tables = self.tables.read();
        Ok(tables
            .billing_accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_service_usage(&self, request: &ServiceUsageUpsertDBRequest) -> Result<ServiceUsageDBResponse> {
        let usage = ServiceUsageDBResponse {
            user_id: request.user_id,
            project_id: request.project_id.clone(),
            service_id: request.service_id.clone(),
            service_name: request.service_name.clone(),
            period_start: request.period_start,
            cost: request.cost,
            share: request.share,
            updated_at: Utc::now(),
        };
        let key = (
            request.user_id,
            request.project_id.clone(),
            request.service_id.clone(),
            request.period_start,
        );
        self.tables.write().service_usage.insert(key, usage.clone());
        Ok(usage)
    }

    async fn list_service_usage(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<ServiceUsageDBResponse>> {
        let tables = self.tables.read();
        let mut usage: Vec<_> = tables
            .service_usage
            .values()
            .filter(|u| u.user_id == user_id && period_start.is_none_or(|p| u.period_start == p))
            .cloned()
            .collect();
        usage.sort_by(|a, b| {
            b.period_start
                .cmp(&a.period_start)
                .then_with(|| a.project_id.cmp(&b.project_id))
                .then_with(|| a.service_id.cmp(&b.service_id))
        });
        Ok(usage)
    }

    async fn upsert_cost_history(&self, entry: &CostHistoryEntry) -> Result<()> {
        self.tables
            .write()
            .cost_history
            .insert((entry.user_id, entry.project_id.clone(), entry.day), entry.clone());
        Ok(())
    }

    async fn list_cost_history(&self, user_id: UserId) -> Result<Vec<CostHistoryEntry>> {
        let tables = self.tables.read();
        Ok(tables
            .cost_history
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_carbon(&self, request: &CarbonUpsertDBRequest) -> Result<CarbonDBResponse> {
        let row = CarbonDBResponse {
            user_id: request.user_id,
            project_id: request.project_id.clone(),
            period_start: request.period_start,
            region: request.region.clone(),
            energy_kwh: request.energy_kwh,
            carbon_kg: request.carbon_kg,
            source: request.source,
            updated_at: Utc::now(),
        };
        self.tables
            .write()
            .carbon
            .insert((request.user_id, request.project_id.clone(), request.period_start), row.clone());
        Ok(row)
    }

    async fn list_carbon(&self, user_id: UserId, period_start: Option<NaiveDate>) -> Result<Vec<CarbonDBResponse>> {
        let tables = self.tables.read();
        let mut rows: Vec<_> = tables
            .carbon
            .values()
            .filter(|c| c.user_id == user_id && period_start.is_none_or(|p| c.period_start == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.period_start
                .cmp(&a.period_start)
                .then_with(|| a.project_id.cmp(&b.project_id))
        });
        Ok(rows)
    }

    async fn upsert_recommendation(&self, request: &RecommendationUpsertDBRequest) -> Result<RecommendationDBResponse> {
        let now = Utc::now();
        let mut tables = self.tables.write();
        let existing = tables.recommendations.iter_mut().find(|r| {
            r.user_id == request.user_id
                && r.project_id == request.project_id
                && r.recommendation_type == request.recommendation_type
        });

        if let Some(existing) = existing {
            existing.title = request.title.clone();
            existing.description = request.description.clone();
            existing.estimated_monthly_savings = request.estimated_monthly_savings;
            existing.estimated_carbon_reduction_kg = request.estimated_carbon_reduction_kg;
            existing.priority = request.priority;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let recommendation = RecommendationDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            project_id: request.project_id.clone(),
            recommendation_type: request.recommendation_type.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            estimated_monthly_savings: request.estimated_monthly_savings,
            estimated_carbon_reduction_kg: request.estimated_carbon_reduction_kg,
            priority: request.priority,
            status: RecommendationStatus::Open,
            created_at: now,
            updated_at: now,
        };
        tables.recommendations.push(recommendation.clone());
        Ok(recommendation)
    }

    async fn list_recommendations(
        &self,
        user_id: UserId,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<RecommendationDBResponse>> {
        let tables = self.tables.read();
        let mut recommendations: Vec<_> = tables
            .recommendations
            .iter()
            .filter(|r| r.user_id == user_id && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        recommendations.sort_by(|a, b| {
            b.estimated_monthly_savings
                .cmp(&a.estimated_monthly_savings)
                .then_with(|| a.project_id.cmp(&b.project_id))
                .then_with(|| a.recommendation_type.cmp(&b.recommendation_type))
        });
        Ok(recommendations)
    }

    async fn update_recommendation_status(
        &self,
        user_id: UserId,
        id: RecommendationId,
        status: RecommendationStatus,
    ) -> Result<Option<RecommendationDBResponse>> {
        let mut tables = self.tables.write();
        Ok(tables
            .recommendations
            .iter_mut()
            .find(|r| r.user_id == user_id && r.id == id)
            .map(|r| {
                r.status = status;
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn retire_open_recommendations(&self, user_id: UserId, keep: &[RecommendationId]) -> Result<u64> {
        let mut tables = self.tables.write();
        let before = tables.recommendations.len();
        tables.recommendations.retain(|r| {
            r.user_id != user_id || r.status != RecommendationStatus::Open || keep.contains(&r.id)
        });
        Ok((before - tables.recommendations.len()) as u64)
    }

    async fn upsert_anomaly(&self, request: &AnomalyUpsertDBRequest) -> Result<AnomalyDBResponse> {
        let now = Utc::now();
        let mut tables = self.tables.write();
        let existing = tables
            .anomalies
            .iter_mut()
            .find(|a| a.user_id == request.user_id && a.project_id == request.project_id && a.day == request.day);

        if let Some(existing) = existing {
            existing.expected_cost = request.expected_cost;
            existing.actual_cost = request.actual_cost;
            existing.deviation_pct = request.deviation_pct;
            existing.severity = request.severity;
            existing.detected_at = now;
            return Ok(existing.clone());
        }

        let anomaly = AnomalyDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            project_id: request.project_id.clone(),
            day: request.day,
            expected_cost: request.expected_cost,
            actual_cost: request.actual_cost,
            deviation_pct: request.deviation_pct,
            severity: request.severity,
            status: AnomalyStatus::Open,
            detected_at: now,
        };
        tables.anomalies.push(anomaly.clone());
        Ok(anomaly)
    }

    async fn list_anomalies(&self, user_id: UserId, status: Option<AnomalyStatus>) -> Result<Vec<AnomalyDBResponse>> {
        let tables = self.tables.read();
        let mut anomalies: Vec<_> = tables
            .anomalies
            .iter()
            .filter(|a| a.user_id == user_id && status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        anomalies.sort_by(|a, b| b.day.cmp(&a.day).then_with(|| a.project_id.cmp(&b.project_id)));
        Ok(anomalies)
    }

    async fn update_anomaly_status(
        &self,
        user_id: UserId,
        id: AnomalyId,
        status: AnomalyStatus,
    ) -> Result<Option<AnomalyDBResponse>> {
        let mut tables = self.tables.write();
        Ok(tables
            .anomalies
            .iter_mut()
            .find(|a| a.user_id == user_id && a.id == id)
            .map(|a| {
                a.status = status;
                a.clone()
            }))
    }

    async fn create_budget(&self, request: &BudgetCreateDBRequest) -> Result<BudgetDBResponse> {
        let now = Utc::now();
        let mut tables = self.tables.write();
        let existing = tables
            .budgets
            .iter_mut()
            .find(|b| b.user_id == request.user_id && b.name == request.name);

        if let Some(existing) = existing {
            existing.project_id = request.project_id.clone();
            existing.amount = request.amount;
            existing.period = request.period;
            existing.alert_threshold_pct = request.alert_threshold_pct;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let budget = BudgetDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            name: request.name.clone(),
            project_id: request.project_id.clone(),
            amount: request.amount,
            period: request.period,
            alert_threshold_pct: request.alert_threshold_pct,
            created_at: now,
            updated_at: now,
        };
        tables.budgets.push(budget.clone());
        Ok(budget)
    }

    async fn get_budget(&self, user_id: UserId, id: BudgetId) -> Result<Option<BudgetDBResponse>> {
        let tables = self.tables.read();
        Ok(tables
            .budgets
            .iter()
            .find(|b| b.user_id == user_id && b.id == id)
            .cloned())
    }

    async fn list_budgets(&self, user_id: UserId) -> Result<Vec<BudgetDBResponse>> {
        let tables = self.tables.read();
        let mut budgets: Vec<_> = tables.budgets.iter().filter(|b| b.user_id == user_id).cloned().collect();
        budgets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(budgets)
    }

    async fn update_budget(
        &self,
        user_id: UserId,
        id: BudgetId,
        request: &BudgetUpdateDBRequest,
    ) -> Result<Option<BudgetDBResponse>> {
        let mut tables = self.tables.write();
        if let Some(name) = &request.name
            && tables
                .budgets
                .iter()
                .any(|b| b.user_id == user_id && b.id != id && &b.name == name)
        {
            return Err(budget_name_taken(name));
        }

        Ok(tables
            .budgets
            .iter_mut()
            .find(|b| b.user_id == user_id && b.id == id)
            .map(|budget| {
                if let Some(name) = &request.name {
                    budget.name = name.clone();
                }
                if let Some(project_id) = &request.project_id {
                    budget.project_id = project_id.clone();
                }
                if let Some(amount) = request.amount {
                    budget.amount = amount;
                }
                if let Some(threshold) = request.alert_threshold_pct {
                    budget.alert_threshold_pct = threshold;
                }
                budget.updated_at = Utc::now();
                budget.clone()
            }))
    }

    async fn delete_budget(&self, user_id: UserId, id: BudgetId) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.budgets.len();
        tables.budgets.retain(|b| !(b.user_id == user_id && b.id == id));
        Ok(tables.budgets.len() < before)
    }

    async fn count_rows(&self, user_id: UserId) -> Result<RowCounts> {
        Ok(count(&self.tables.read(), user_id))
    }
}

fn count(tables: &Tables, user_id: UserId) -> RowCounts {
    let len = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
    RowCounts {
        projects: len(tables.projects.keys().filter(|(owner, _)| *owner == user_id).count()),
        billing_accounts: len(tables.billing_accounts.keys().filter(|(owner, _)| *owner == user_id).count()),
        service_usage: len(tables.service_usage.keys().filter(|(owner, ..)| *owner == user_id).count()),
        cost_history: len(tables.cost_history.keys().filter(|(owner, ..)| *owner == user_id).count()),
        carbon_footprint: len(tables.carbon.keys().filter(|(owner, ..)| *owner == user_id).count()),
        recommendations: len(tables.recommendations.iter().filter(|r| r.user_id == user_id).count()),
        anomalies: len(tables.anomalies.iter().filter(|a| a.user_id == user_id).count()),
        budgets: len(tables.budgets.iter().filter(|b| b.user_id == user_id).count()),
    }
}

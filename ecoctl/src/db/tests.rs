//! Behaviour shared by every [`Store`] implementation.
//!
//! Each scenario is written once against the trait and run against the in-memory store; the
//! Postgres variants run with `--features postgres-tests` and a `DATABASE_URL`.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    InMemoryStore, RowCounts, Store,
    errors::DbError,
    models::{
        anomalies::{AnomalyStatus, AnomalyUpsertDBRequest, Severity},
        budgets::{BudgetCreateDBRequest, BudgetPeriod, BudgetUpdateDBRequest},
        carbon::{CarbonSource, CarbonUpsertDBRequest},
        connections::{ConnectionStatus, ConnectionUpsertDBRequest, SyncOutcome},
        costs::{CostHistoryEntry, ServiceUsageUpsertDBRequest},
        projects::ProjectUpsertDBRequest,
        recommendations::{Priority, RecommendationStatus, RecommendationUpsertDBRequest},
    },
};

#[cfg(feature = "postgres-tests")]
use super::PostgresStore;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

fn connection_request(user_id: Uuid, refresh_token: Option<&str>) -> ConnectionUpsertDBRequest {
    ConnectionUpsertDBRequest {
        user_id,
        google_account_id: "10987654321".to_string(),
        google_email: Some("ops@example.com".to_string()),
        access_token: "sealed-access".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        scopes: Some("openid".to_string()),
    }
}

fn project_request(user_id: Uuid, project_id: &str, cost: Decimal) -> ProjectUpsertDBRequest {
    ProjectUpsertDBRequest {
        user_id,
        project_id: project_id.to_string(),
        name: Some(project_id.to_uppercase()),
        project_number: None,
        lifecycle_state: Some("ACTIVE".to_string()),
        billing_account_id: Some("AAA".to_string()),
        billing_enabled: true,
        current_month_cost: cost,
    }
}

async fn run_test_connection_lifecycle<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    assert!(store.get_connection(user_id).await.unwrap().is_none());

    store
        .upsert_connection(&connection_request(user_id, Some("sealed-refresh")))
        .await
        .unwrap();
    // A reconnect without a refresh token keeps the stored one
    let connection = store.upsert_connection(&connection_request(user_id, None)).await.unwrap();
    assert_eq!(connection.refresh_token.as_deref(), Some("sealed-refresh"));
    assert_eq!(connection.status, ConnectionStatus::Active);

    store
        .record_sync(user_id, &SyncOutcome::Failed("quota exceeded".to_string()))
        .await
        .unwrap();
    let connection = store.get_connection(user_id).await.unwrap().unwrap();
    assert_eq!(connection.status, ConnectionStatus::Error);
    assert_eq!(connection.last_error.as_deref(), Some("quota exceeded"));

    store.record_sync(user_id, &SyncOutcome::Succeeded).await.unwrap();
    let connection = store.get_connection(user_id).await.unwrap().unwrap();
    assert_eq!(connection.status, ConnectionStatus::Active);
    assert!(connection.last_sync_at.is_some());
    assert!(connection.last_error.is_none());

    store
        .update_connection_tokens(user_id, "sealed-access-2", None, None)
        .await
        .unwrap();
    let connection = store.get_connection(user_id).await.unwrap().unwrap();
    assert_eq!(connection.access_token.as_deref(), Some("sealed-access-2"));
    assert_eq!(connection.refresh_token.as_deref(), Some("sealed-refresh"));

    assert!(store.disconnect(user_id).await.unwrap());
    let connection = store.get_connection(user_id).await.unwrap().unwrap();
    assert_eq!(connection.status, ConnectionStatus::Disconnected);
    assert!(connection.access_token.is_none());
    assert!(connection.refresh_token.is_none());
    assert!(!connection.is_usable());

    assert!(!store.disconnect(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_connection_lifecycle() {
    run_test_connection_lifecycle(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_connection_lifecycle_postgres(pool: sqlx::PgPool) {
    run_test_connection_lifecycle(&PostgresStore::new(pool)).await;
}

async fn run_test_repeated_upserts_do_not_duplicate<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let period = day(1);

    for cost in [Decimal::new(100, 0), Decimal::new(250, 0)] {
        store.upsert_project(&project_request(user_id, "alpha", cost)).await.unwrap();
        store
            .upsert_service_usage(&ServiceUsageUpsertDBRequest {
                user_id,
                project_id: "alpha".to_string(),
                service_id: "6F81-5844-456A".to_string(),
                service_name: "Compute Engine".to_string(),
                period_start: period,
                cost: cost * Decimal::new(40, 2),
                share: 0.4,
            })
            .await
            .unwrap();
        store
            .upsert_cost_history(&CostHistoryEntry {
                user_id,
                project_id: "alpha".to_string(),
                day: day(2),
                cost,
            })
            .await
            .unwrap();
        store
            .upsert_carbon(&CarbonUpsertDBRequest {
                user_id,
                project_id: "alpha".to_string(),
                period_start: period,
                region: "us-central1".to_string(),
                energy_kwh: 10.0,
                carbon_kg: 4.0,
                source: CarbonSource::Estimate,
            })
            .await
            .unwrap();
    }

    let projects = store.list_projects(user_id).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].current_month_cost, Decimal::new(250, 0));

    let usage = store.list_service_usage(user_id, Some(period)).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].cost, Decimal::new(100, 0));

    let history = store.list_cost_history(user_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cost, Decimal::new(250, 0));

    let counts = store.count_rows(user_id).await.unwrap();
    assert_eq!(counts.projects, 1);
    assert_eq!(counts.service_usage, 1);
    assert_eq!(counts.cost_history, 1);
    assert_eq!(counts.carbon_footprint, 1);

    // Another user's rows are invisible
    assert!(store.list_projects(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_upserts_do_not_duplicate() {
    run_test_repeated_upserts_do_not_duplicate(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_repeated_upserts_do_not_duplicate_postgres(pool: sqlx::PgPool) {
    run_test_repeated_upserts_do_not_duplicate(&PostgresStore::new(pool)).await;
}

async fn run_test_recommendation_upsert_keeps_status<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let request = RecommendationUpsertDBRequest {
        user_id,
        project_id: "alpha".to_string(),
        recommendation_type: "rightsize_compute".to_string(),
        title: "Rightsize".to_string(),
        description: "Shrink idle VMs".to_string(),
        estimated_monthly_savings: Decimal::new(50, 0),
        estimated_carbon_reduction_kg: 1.5,
        priority: Priority::Medium,
    };

    let created = store.upsert_recommendation(&request).await.unwrap();
    assert_eq!(created.status, RecommendationStatus::Open);

    let dismissed = store
        .update_recommendation_status(user_id, created.id, RecommendationStatus::Dismissed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dismissed.status, RecommendationStatus::Dismissed);

    let refreshed = store
        .upsert_recommendation(&RecommendationUpsertDBRequest {
            estimated_monthly_savings: Decimal::new(80, 0),
            ..request
        })
        .await
        .unwrap();
    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.status, RecommendationStatus::Dismissed);
    assert_eq!(refreshed.estimated_monthly_savings, Decimal::new(80, 0));

    assert!(
        store
            .list_recommendations(user_id, Some(RecommendationStatus::Open))
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(store.list_recommendations(user_id, None).await.unwrap().len(), 1);

    // Other users cannot touch it
    assert!(
        store
            .update_recommendation_status(Uuid::new_v4(), created.id, RecommendationStatus::Applied)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_recommendation_upsert_keeps_status() {
    run_test_recommendation_upsert_keeps_status(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_recommendation_upsert_keeps_status_postgres(pool: sqlx::PgPool) {
    run_test_recommendation_upsert_keeps_status(&PostgresStore::new(pool)).await;
}

async fn run_test_anomaly_upsert_and_status<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let request = AnomalyUpsertDBRequest {
        user_id,
        project_id: "alpha".to_string(),
        day: day(14),
        expected_cost: Decimal::new(10, 0),
        actual_cost: Decimal::new(16, 0),
        deviation_pct: 60.0,
        severity: Severity::Medium,
    };
    let first = store.upsert_anomaly(&request).await.unwrap();
    store
        .update_anomaly_status(user_id, first.id, AnomalyStatus::Acknowledged)
        .await
        .unwrap();

    let second = store
        .upsert_anomaly(&AnomalyUpsertDBRequest {
            actual_cost: Decimal::new(25, 0),
            deviation_pct: 150.0,
            severity: Severity::High,
            ..request
        })
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, AnomalyStatus::Acknowledged);
    assert_eq!(second.severity, Severity::High);

    assert_eq!(store.list_anomalies(user_id, None).await.unwrap().len(), 1);
    assert!(store.list_anomalies(user_id, Some(AnomalyStatus::Open)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_anomaly_upsert_and_status() {
    run_test_anomaly_upsert_and_status(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_anomaly_upsert_and_status_postgres(pool: sqlx::PgPool) {
    run_test_anomaly_upsert_and_status(&PostgresStore::new(pool)).await;
}

async fn run_test_budget_crud<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let create = |name: &str, amount: i64| BudgetCreateDBRequest {
        user_id,
        name: name.to_string(),
        project_id: None,
        amount: Decimal::new(amount, 0),
        period: BudgetPeriod::Monthly,
        alert_threshold_pct: 80.0,
    };

    let monthly = store.create_budget(&create("monthly", 1000)).await.unwrap();
    // Posting the same name again replaces rather than duplicates
    let replaced = store.create_budget(&create("monthly", 1500)).await.unwrap();
    assert_eq!(replaced.id, monthly.id);
    assert_eq!(replaced.amount, Decimal::new(1500, 0));

    let other = store.create_budget(&create("analytics", 200)).await.unwrap();
    let names: Vec<String> = store.list_budgets(user_id).await.unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["analytics", "monthly"]);

    let updated = store
        .update_budget(
            user_id,
            other.id,
            &BudgetUpdateDBRequest {
                project_id: Some(Some("alpha".to_string())),
                alert_threshold_pct: Some(50.0),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.project_id.as_deref(), Some("alpha"));
    assert_eq!(updated.alert_threshold_pct, 50.0);
    assert_eq!(updated.amount, Decimal::new(200, 0));

    let clash = store
        .update_budget(
            user_id,
            other.id,
            &BudgetUpdateDBRequest {
                name: Some("monthly".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(clash, Err(DbError::UniqueViolation { .. })));

    assert!(store.get_budget(Uuid::new_v4(), other.id).await.unwrap().is_none());
    assert!(store.delete_budget(user_id, other.id).await.unwrap());
    assert!(!store.delete_budget(user_id, other.id).await.unwrap());
    assert!(store.get_budget(user_id, other.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_budget_crud() {
    run_test_budget_crud(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_budget_crud_postgres(pool: sqlx::PgPool) {
    run_test_budget_crud(&PostgresStore::new(pool)).await;
}

async fn run_test_purge_user_data<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let bystander = Uuid::new_v4();
    store.upsert_connection(&connection_request(user_id, None)).await.unwrap();
    for owner in [user_id, bystander] {
        store
            .upsert_project(&project_request(owner, "alpha", Decimal::ONE))
            .await
            .unwrap();
        store
            .upsert_cost_history(&CostHistoryEntry {
                user_id: owner,
                project_id: "alpha".to_string(),
                day: day(3),
                cost: Decimal::ONE,
            })
            .await
            .unwrap();
    }

    assert_eq!(store.purge_user_data(user_id).await.unwrap(), 2);
    assert_eq!(store.count_rows(user_id).await.unwrap(), RowCounts::default());
    assert_eq!(store.count_rows(bystander).await.unwrap().projects, 1);
    // The connection row survives a purge
    assert!(store.get_connection(user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_purge_user_data() {
    run_test_purge_user_data(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_purge_user_data_postgres(pool: sqlx::PgPool) {
    run_test_purge_user_data(&PostgresStore::new(pool)).await;
}

async fn run_test_retire_projects<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let bystander = Uuid::new_v4();
    let period = day(1);
    let previous = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();

    for (owner, project_id) in [(user_id, "alpha"), (user_id, "beta"), (bystander, "beta")] {
        store
            .upsert_project(&project_request(owner, project_id, Decimal::new(50, 0)))
            .await
            .unwrap();
        for period_start in [previous, period] {
            store
                .upsert_service_usage(&ServiceUsageUpsertDBRequest {
                    user_id: owner,
                    project_id: project_id.to_string(),
                    service_id: "6F81-5844-456A".to_string(),
                    service_name: "Compute Engine".to_string(),
                    period_start,
                    cost: Decimal::new(20, 0),
                    share: 0.4,
                })
                .await
                .unwrap();
        }
        store
            .upsert_carbon(&CarbonUpsertDBRequest {
                user_id: owner,
                project_id: project_id.to_string(),
                period_start: period,
                region: "us-central1".to_string(),
                energy_kwh: 10.0,
                carbon_kg: 4.0,
                source: CarbonSource::Estimate,
            })
            .await
            .unwrap();
    }

    let retired = store
        .retire_projects(user_id, &["alpha".to_string()], period)
        .await
        .unwrap();
    assert_eq!(retired, 1);

    let projects = store.list_projects(user_id).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].project_id, "alpha");
    let usage = store.list_service_usage(user_id, Some(period)).await.unwrap();
    assert!(usage.iter().all(|u| u.project_id == "alpha"));
    assert_eq!(store.list_carbon(user_id, Some(period)).await.unwrap().len(), 1);
    // Closed months keep their history
    assert_eq!(store.list_service_usage(user_id, Some(previous)).await.unwrap().len(), 2);
    assert_eq!(store.count_rows(bystander).await.unwrap().projects, 1);

    // An empty listing retires everything
    assert_eq!(store.retire_projects(user_id, &[], period).await.unwrap(), 1);
    assert!(store.list_projects(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retire_projects() {
    run_test_retire_projects(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_retire_projects_postgres(pool: sqlx::PgPool) {
    run_test_retire_projects(&PostgresStore::new(pool)).await;
}

async fn run_test_retire_open_recommendations<S: Store>(store: &S) {
    let user_id = Uuid::new_v4();
    let mut ids = Vec::new();
    for recommendation_type in ["rightsize_compute", "storage_lifecycle", "committed_use"] {
        let created = store
            .upsert_recommendation(&RecommendationUpsertDBRequest {
                user_id,
                project_id: "alpha".to_string(),
                recommendation_type: recommendation_type.to_string(),
                title: recommendation_type.to_string(),
                description: String::new(),
                estimated_monthly_savings: Decimal::new(30, 0),
                estimated_carbon_reduction_kg: 0.5,
                priority: Priority::Low,
            })
            .await
            .unwrap();
        ids.push(created.id);
    }
    store
        .update_recommendation_status(user_id, ids[1], RecommendationStatus::Applied)
        .await
        .unwrap();

    let retired = store.retire_open_recommendations(user_id, &ids[..1]).await.unwrap();
    assert_eq!(retired, 1);

    let remaining = store.list_recommendations(user_id, None).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|r| r.id == ids[0] && r.status == RecommendationStatus::Open));
    assert!(remaining.iter().any(|r| r.id == ids[1] && r.status == RecommendationStatus::Applied));
}

#[tokio::test]
async fn test_retire_open_recommendations() {
    run_test_retire_open_recommendations(&InMemoryStore::new()).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_retire_open_recommendations_postgres(pool: sqlx::PgPool) {
    run_test_retire_open_recommendations(&PostgresStore::new(pool)).await;
}

//! OpenAPI documentation for the `/api/gcp/*` and `/api/test/*` endpoints, served by Scalar at
//! `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Bearer token security scheme shared by every route
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token issued by the dashboard's auth provider:\n\n\
                            ```\nAuthorization: Bearer YOUR_ACCESS_TOKEN\n```\n\n\
                            The token's `sub` claim identifies the user every row belongs to.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ecoctl",
        description = "Google Cloud cost and carbon tracking: account connection, data sync, budgets, \
                       anomalies and optimization recommendations."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::connection::get_auth_url,
        api::handlers::connection::connect,
        api::handlers::connection::get_status,
        api::handlers::connection::disconnect,
        api::handlers::costs::sync_costs,
        api::handlers::costs::list_projects,
        api::handlers::costs::list_billing_accounts,
        api::handlers::costs::list_services,
        api::handlers::carbon::sync_carbon,
        api::handlers::carbon::list_carbon,
        api::handlers::anomalies::detect_anomalies,
        api::handlers::anomalies::list_anomalies,
        api::handlers::anomalies::update_anomaly,
        api::handlers::budgets::list_budgets,
        api::handlers::budgets::create_budget,
        api::handlers::budgets::get_budget,
        api::handlers::budgets::update_budget,
        api::handlers::budgets::delete_budget,
        api::handlers::budgets::get_alerts,
        api::handlers::recommendations::generate_recommendations,
        api::handlers::recommendations::list_recommendations,
        api::handlers::recommendations::update_recommendation,
        api::handlers::dashboard::get_dashboard,
        api::handlers::diagnostics::get_debug,
        api::handlers::diagnostics::test_connection,
        api::handlers::diagnostics::test_database,
    ),
    components(schemas(api::models::ErrorResponse)),
    tags(
        (name = "connection", description = "Connect and disconnect a Google Cloud account through OAuth."),
        (name = "costs", description = "Billing accounts, projects and per-service costs."),
        (name = "carbon", description = "Monthly carbon footprint per project, from the export or estimated."),
        (name = "anomalies", description = "Days whose cost is well above the trailing average."),
        (name = "budgets", description = "Monthly budgets evaluated against current spend."),
        (name = "recommendations", description = "Rule-based cost and carbon optimizations."),
        (name = "dashboard", description = "Headline figures for the current month."),
        (name = "diagnostics", description = "Connection state and live checks."),
    )
)]
pub struct ApiDoc;

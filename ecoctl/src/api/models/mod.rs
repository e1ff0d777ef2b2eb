//! Request and response bodies of the HTTP API.
//!
//! Successful responses are wrapped in [`ApiResponse`] (`{"success": true, "data": ...}`);
//! failures are rendered by [`crate::errors::Error`] as `{"error": "..."}`.

pub mod anomalies;
pub mod budgets;
pub mod carbon;
pub mod connections;
pub mod costs;
pub mod dashboard;
pub mod diagnostics;
pub mod recommendations;

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}

/// Body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

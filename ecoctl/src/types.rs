//! Common type definitions.
//!
//! Entity IDs are UUIDs wrapped in type aliases so signatures say which row they point at:
//!
//! - [`UserId`]: the `sub` claim of the caller's bearer token
//! - [`RecommendationId`], [`AnomalyId`], [`BudgetId`]: surrogate keys for rows the user can
//!   address directly through the API
//!
//! Google-side identifiers (project IDs, billing account names, service IDs) stay `String`s.

use uuid::Uuid;

pub type UserId = Uuid;
pub type RecommendationId = Uuid;
pub type AnomalyId = Uuid;
pub type BudgetId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

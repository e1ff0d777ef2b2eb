//! Database record structures matching the table schemas.

pub mod anomalies;
pub mod budgets;
pub mod carbon;
pub mod connections;
pub mod costs;
pub mod projects;
pub mod recommendations;

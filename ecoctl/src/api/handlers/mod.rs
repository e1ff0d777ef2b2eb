//! HTTP route handlers.
//!
//! Every handler takes the [`CurrentUser`](crate::auth::current_user::CurrentUser) extractor, so
//! a missing or invalid bearer token is rejected with 401 before the handler body runs. Handlers
//! stay thin: they resolve the caller's rows through [`crate::db::Store`] and delegate sync and
//! analysis work to [`crate::sync`].

pub mod anomalies;
pub mod budgets;
pub mod carbon;
pub mod connection;
pub mod costs;
pub mod dashboard;
pub mod diagnostics;
pub mod recommendations;

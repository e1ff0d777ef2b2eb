//! Bearer token authentication.
//!
//! Every `/api/gcp/*` and `/api/test/*` route requires an `Authorization: Bearer <token>` header.
//! The token is an HS256 JWT issued by the auth provider fronting the dashboard (a Supabase
//! project in the reference deployment); its `sub` claim is the user ID every stored row is keyed
//! by.
//!
//! # Modules
//!
//! - [`current_user`]: the [`current_user::CurrentUser`] extractor used by handlers
//! - [`session`]: token verification and the claims it yields
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use ecoctl::auth::current_user::CurrentUser;
//!
//! async fn protected_handler(user: CurrentUser) -> String {
//!     format!("Hello, {}!", user.id)
//! }
//! ```

pub mod current_user;
pub mod session;

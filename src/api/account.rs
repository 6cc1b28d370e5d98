//! Protected account page
//!
//! Mounted behind [`require_session`](crate::auth::require_session).

use axum::{Extension, Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;
use crate::auth::session::{Session, SessionUser};
use crate::error::AppError;

/// Create account router
///
/// Routes:
/// - GET /account - Signed-in user and linked providers
pub fn account_router() -> Router<AppState> {
    Router::new().route("/account", get(account))
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: SessionUser,
    /// Names of the providers linked to this user
    pub providers: Vec<String>,
}

/// GET /account
async fn account(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<AccountResponse>, AppError> {
    let providers = state
        .db
        .get_oauth_accounts(&session.user.id)
        .await?
        .into_iter()
        .map(|account| account.provider)
        .collect();

    Ok(Json(AccountResponse {
        user: session.user,
        providers,
    }))
}

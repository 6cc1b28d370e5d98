//! OAuth authentication
//!
//! Handles:
//! - GitHub and Google OAuth flows
//! - Session management
//! - Authentication middleware and the protected-area guard
//! - Sign-in page, login/logout actions and the password reset stub

mod actions;
mod middleware;
mod oauth;
pub mod provider;
mod reset;
pub mod session;

pub use middleware::{
    AUTH_ENTRY_PATH, AuthState, CurrentUser, guard, require_session, resolve_session,
};
pub use oauth::{SessionView, complete_sign_in};
pub use provider::{
    AuthorizationRequest, GitHubProvider, GoogleProvider, OAuthProvider, ProviderRegistry,
};
pub use reset::RESET_REQUESTED_MESSAGE;
pub use session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};

use axum::Router;

use crate::AppState;

/// Create authentication router
///
/// Combines the sign-in page, OAuth flow and password reset routes.
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .merge(actions::actions_router())
        .merge(oauth::oauth_router())
        .merge(reset::reset_router())
}

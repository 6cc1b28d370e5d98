//! Authentication middleware
//!
//! Resolves the caller's session and protects routes that require one.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::{SESSION_COOKIE, Session, verify_session_token};
use crate::AppState;
use crate::error::AppError;
use crate::response::{Outcome, redirect_response};

/// Who is making the request
#[derive(Debug, Clone)]
pub enum AuthState {
    Authenticated(Session),
    Anonymous,
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Anonymous => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Anonymous => None,
        }
    }
}

pub(crate) fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        })
}

/// Resolve the session carried by a request
///
/// Missing, malformed, expired or revoked tokens resolve to
/// [`AuthState::Anonymous`]. Only a failing session lookup is an error.
pub async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthState, AppError> {
    let Some(token) = extract_token_from_headers(headers) else {
        return Ok(AuthState::Anonymous);
    };

    let Some(session) = verify_session_token(&token, &state.config.auth.session_secret) else {
        tracing::debug!("Ignoring invalid session token");
        return Ok(AuthState::Anonymous);
    };

    match state.db.get_session_record(&session.session_id).await? {
        Some(record) if !record.is_expired() && record.user_id == session.user.id => {
            Ok(AuthState::Authenticated(session))
        }
        _ => {
            tracing::debug!(session_id = %session.session_id, "Session revoked or expired");
            Ok(AuthState::Anonymous)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthState
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(AuthState::Authenticated(session));
        }

        let app_state = AppState::from_ref(state);
        let auth = resolve_session(&app_state, &parts.headers).await?;
        if let AuthState::Authenticated(session) = &auth {
            parts.extensions.insert(session.clone());
        }

        Ok(auth)
    }
}

/// Extractor for current authenticated user
///
/// Rejects anonymous callers with 401.
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(session): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", session.user.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        AuthState::from_request_parts(parts, state)
            .await?
            .into_session()
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Entry point of the sign-in flow
pub const AUTH_ENTRY_PATH: &str = "/auth";

/// Decide whether a protected page may render
///
/// Anonymous callers are sent to the sign-in page with the original path
/// as `redirectTo`.
pub fn guard(auth: AuthState, path: &str) -> Outcome<Session> {
    match auth {
        AuthState::Authenticated(session) => Outcome::Render(session),
        AuthState::Anonymous => Outcome::found(format!(
            "{}?redirectTo={}",
            AUTH_ENTRY_PATH,
            urlencoding::encode(path)
        )),
    }
}

/// Middleware for the protected area
///
/// Adds the Session to request extensions, or redirects to sign-in.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/account", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_session));
/// ```
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth = resolve_session(&state, request.headers()).await?;

    match guard(auth, request.uri().path()) {
        Outcome::Render(session) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        Outcome::Redirect { status, location } => Ok(redirect_response(status, &location)),
    }
}

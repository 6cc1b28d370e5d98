//! OAuth sign-in flow
//!
//! Implements the OAuth 2.0 authorization code flow (with PKCE) against
//! the providers in [`ProviderRegistry`](super::ProviderRegistry). CSRF
//! state, PKCE verifier and callback path travel in short-lived cookies
//! scoped to the callback route.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::{AuthState, extract_token_from_headers};
use super::provider::OAuthProvider;
use super::session::{SESSION_COOKIE, Session, SessionUser, create_session_token, verify_session_token};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::SIGN_INS_TOTAL;
use crate::response::{Outcome, sanitize_callback_path};

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_CALLBACK_COOKIE: &str = "oauth_callback";
const OAUTH_PKCE_COOKIE: &str = "oauth_pkce";
const OAUTH_COOKIE_PATH: &str = "/auth/callback";

/// Create OAuth router
///
/// Routes:
/// - GET /auth/signin/:provider - Redirect to provider
/// - GET /auth/callback/:provider - OAuth callback
/// - GET /auth/signout - Sign-out confirmation
/// - POST /auth/signout - Sign out
/// - GET /auth/session - Current session as JSON
pub fn oauth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/signin/:provider", get(sign_in))
        .route("/auth/callback/:provider", get(callback))
        .route("/auth/signout", get(sign_out_page).post(sign_out))
        .route("/auth/session", get(current_session))
}

fn callback_uri(state: &AppState, provider: &str) -> String {
    format!(
        "{}/auth/callback/{}",
        state.config.server.base_url(),
        provider
    )
}

fn build_flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(OAUTH_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path(path).http_only(true).build();
    cookie.make_removal();
    cookie
}

/// Session cookie; the token itself carries the expiry
pub(crate) fn build_session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

// =============================================================================
// Sign in
// =============================================================================

#[derive(Debug, Deserialize)]
struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

/// GET /auth/signin/:provider
///
/// # Steps
/// 1. Resolve the provider (unknown → 400)
/// 2. Build the consent URL with fresh CSRF state and PKCE challenge
/// 3. Store state, verifier and callback path in short-lived cookies
/// 4. Redirect to the provider's consent page
async fn sign_in(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(query): Query<SignInQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Outcome<()>), AppError> {
    let provider = state.providers.get(&provider_name)?;
    let secure = state.config.should_use_secure_cookies();

    let request = provider.authorize(&callback_uri(&state, provider.name()))?;
    let callback_path = sanitize_callback_path(query.callback_url.as_deref());

    let jar = jar
        .add(build_flow_cookie(OAUTH_STATE_COOKIE, request.csrf_state, secure))
        .add(build_flow_cookie(OAUTH_PKCE_COOKIE, request.pkce_verifier, secure))
        .add(build_flow_cookie(OAUTH_CALLBACK_COOKIE, callback_path, secure));

    tracing::debug!(provider = provider.name(), "Redirecting to OAuth provider");
    Ok((jar, Outcome::see_other(request.url)))
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set when the user denied consent or the provider failed
    error: Option<String>,
}

fn flow_cookie<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(returned: Option<&str>, jar: &CookieJar) -> Result<(), AppError> {
    let expected = flow_cookie(jar, OAUTH_STATE_COOKIE).ok_or(AppError::Unauthorized)?;

    match returned {
        Some(returned) if returned == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// PKCE verifier stored when the flow started
fn pkce_verifier(jar: &CookieJar) -> Result<&str, AppError> {
    flow_cookie(jar, OAUTH_PKCE_COOKIE).ok_or(AppError::Unauthorized)
}

fn clear_flow_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(clear_cookie(OAUTH_STATE_COOKIE, OAUTH_COOKIE_PATH))
        .remove(clear_cookie(OAUTH_PKCE_COOKIE, OAUTH_COOKIE_PATH))
        .remove(clear_cookie(OAUTH_CALLBACK_COOKIE, OAUTH_COOKIE_PATH))
}

/// Finish a sign-in once the provider returned a code
///
/// # Steps
/// 1. Exchange code and PKCE verifier for an access token
/// 2. Fetch the provider identity
/// 3. Find or create the user
/// 4. Persist a session row and sign its token
pub async fn complete_sign_in(
    state: &AppState,
    provider: &dyn OAuthProvider,
    code: &str,
    pkce_verifier: &str,
) -> Result<(Session, String), AppError> {
    let redirect_uri = callback_uri(state, provider.name());
    let access_token = provider
        .exchange_code(code, &redirect_uri, pkce_verifier)
        .await?;
    let identity = provider.fetch_identity(&access_token).await?;

    let user = state.db.link_oauth_account(&identity).await?;
    let session = Session::for_user(&user, state.config.auth.session_max_age);
    state.db.insert_session(&session.record()).await?;
    let token = create_session_token(&session, &state.config.auth.session_secret)?;

    tracing::info!(
        user_id = %user.id,
        provider = provider.name(),
        "User signed in"
    );

    Ok((session, token))
}

/// GET /auth/callback/:provider
///
/// # Steps
/// 1. Bail out to the sign-in page if the provider reported an error
/// 2. Verify CSRF state and recover the PKCE verifier
/// 3. Complete sign-in and set the session cookie
/// 4. Redirect to the stored callback path
async fn callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Outcome<()>), AppError> {
    let provider = state.providers.get(&provider_name)?;

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(provider = provider.name(), error, "OAuth provider returned error");
        SIGN_INS_TOTAL
            .with_label_values(&[provider.name(), "denied"])
            .inc();
        return Ok((
            clear_flow_cookies(jar),
            Outcome::found(format!("/auth?error={}", urlencoding::encode(error))),
        ));
    }

    verify_csrf_state(query.state.as_deref(), &jar)?;
    let verifier = pkce_verifier(&jar)?;
    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

    let signed_in = complete_sign_in(&state, provider.as_ref(), code, verifier).await;
    let (_session, token) = match signed_in {
        Ok(signed_in) => signed_in,
        Err(error) => {
            SIGN_INS_TOTAL
                .with_label_values(&[provider.name(), "failed"])
                .inc();
            return Err(error);
        }
    };
    SIGN_INS_TOTAL
        .with_label_values(&[provider.name(), "success"])
        .inc();

    let callback_path =
        sanitize_callback_path(jar.get(OAUTH_CALLBACK_COOKIE).map(|cookie| cookie.value()));
    let jar = clear_flow_cookies(jar).add(build_session_cookie(
        token,
        state.config.should_use_secure_cookies(),
    ));

    Ok((jar, Outcome::found(callback_path)))
}

// =============================================================================
// Sign out
// =============================================================================

/// GET /auth/signout
///
/// Renders a confirmation form posting back to this route.
async fn sign_out_page() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>Sign out - Taco Reviews</title></head>
<body>
    <h1>Sign out</h1>
    <p>Are you sure you want to sign out?</p>
    <form method="post" action="/auth/signout">
        <button type="submit">Sign out</button>
    </form>
</body>
</html>
"#,
    )
}

/// POST /auth/signout
///
/// Revokes the session row, clears the cookie and redirects home.
async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Outcome<()>), AppError> {
    if let Some(session) = extract_token_from_headers(&headers)
        .and_then(|token| verify_session_token(&token, &state.config.auth.session_secret))
    {
        if state.db.delete_session(&session.session_id).await? {
            tracing::info!(user_id = %session.user.id, "Session revoked");
        }
    }

    let jar = jar.remove(clear_cookie(SESSION_COOKIE, "/"));
    Ok((jar, Outcome::see_other("/")))
}

// =============================================================================
// Session
// =============================================================================

/// Public view of the current session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

/// GET /auth/session
///
/// Returns the session or `null` when signed out.
async fn current_session(auth: AuthState) -> Response {
    let view = auth.into_session().map(|session| SessionView {
        user: session.user,
        expires: session.expires_at,
    });
    Json(view).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::MockOAuthProvider;
    use crate::data::OAuthIdentity;
    use crate::test_support::test_state;

    #[test]
    fn csrf_state_must_match_cookie() {
        let jar = CookieJar::new().add(Cookie::new(OAUTH_STATE_COOKIE, "expected"));

        assert!(verify_csrf_state(Some("expected"), &jar).is_ok());
        assert!(matches!(
            verify_csrf_state(Some("other"), &jar),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_csrf_state(None, &jar),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_csrf_state(Some("expected"), &CookieJar::new()),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn callback_requires_pkce_verifier_cookie() {
        let jar = CookieJar::new().add(Cookie::new(OAUTH_PKCE_COOKIE, "verifier-abc"));
        assert_eq!(pkce_verifier(&jar).unwrap(), "verifier-abc");

        let empty = CookieJar::new().add(Cookie::new(OAUTH_PKCE_COOKIE, ""));
        assert!(matches!(pkce_verifier(&empty), Err(AppError::Unauthorized)));
        assert!(matches!(
            pkce_verifier(&CookieJar::new()),
            Err(AppError::Unauthorized)
        ));
    }

    fn mock_provider(email: &'static str, account_id: &'static str) -> MockOAuthProvider {
        let mut provider = MockOAuthProvider::new();
        provider.expect_name().return_const("github");
        provider
            .expect_exchange_code()
            .withf(|code, redirect_uri, verifier| {
                code == "good-code"
                    && redirect_uri.ends_with("/auth/callback/github")
                    && verifier == "verifier-abc"
            })
            .returning(|_, _, _| Ok("access-token".to_string()));
        provider
            .expect_fetch_identity()
            .withf(|token| token == "access-token")
            .returning(move |_| {
                Ok(OAuthIdentity {
                    provider: "github".to_string(),
                    provider_account_id: account_id.to_string(),
                    email: email.to_string(),
                    name: Some("Taco Fan".to_string()),
                    image: Some("https://example.com/a.png".to_string()),
                })
            });
        provider
    }

    #[tokio::test]
    async fn complete_sign_in_creates_user_and_session() {
        let (state, _dir) = test_state().await;
        let provider = mock_provider("fan@example.com", "42");

        let (session, token) = complete_sign_in(&state, &provider, "good-code", "verifier-abc")
            .await
            .unwrap();

        let user = state
            .db
            .get_user_by_email("fan@example.com")
            .await
            .unwrap()
            .expect("user created");
        assert_eq!(session.user.id, user.id);
        assert!(
            state
                .db
                .get_session_record(&session.session_id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(verify_session_token(&token, &state.config.auth.session_secret).is_some());
    }

    #[tokio::test]
    async fn repeated_sign_in_reuses_user() {
        let (state, _dir) = test_state().await;

        let first_provider = mock_provider("fan@example.com", "42");
        let second_provider = mock_provider("fan@example.com", "42");

        let (first, _) = complete_sign_in(&state, &first_provider, "good-code", "verifier-abc")
            .await
            .unwrap();
        let (second, _) = complete_sign_in(&state, &second_provider, "good-code", "verifier-abc")
            .await
            .unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn failed_exchange_creates_nothing() {
        let (state, _dir) = test_state().await;
        let mut provider = MockOAuthProvider::new();
        provider.expect_name().return_const("github");
        provider
            .expect_exchange_code()
            .returning(|_, _, _| Err(AppError::OAuth("bad code".to_string())));
        provider.expect_fetch_identity().never();

        let result = complete_sign_in(&state, &provider, "bad-code", "verifier-abc").await;

        assert!(matches!(result, Err(AppError::OAuth(_))));
        assert!(
            state
                .db
                .get_user_by_email("fan@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }
}

//! Sign-in page and its form actions

use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::api::FormBody;
use crate::error::AppError;
use crate::response::{Outcome, sanitize_callback_path};

/// Create sign-in page router
///
/// Routes:
/// - GET /auth - Sign-in page
/// - POST /auth/login - Start sign-in with a provider
/// - POST /auth/logout - Hand off to the sign-out confirmation
pub fn actions_router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(sign_in_page))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInPageQuery {
    redirect_to: Option<String>,
    error: Option<String>,
}

fn render_sign_in_page(providers: &[(&str, &str)], redirect_to: &str, error: Option<&str>) -> String {
    let buttons = providers
        .iter()
        .map(|(name, display_name)| {
            format!(
                r#"    <button type="submit" name="provider" value="{}">Sign in with {}</button>"#,
                html_escape::encode_double_quoted_attribute(name),
                html_escape::encode_text(display_name),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let error_block = error
        .map(|message| {
            format!(
                r#"  <p class="error">Sign-in failed: {}</p>"#,
                html_escape::encode_text(message)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Sign in - Taco Reviews</title>
</head>
<body>
  <h1>Sign in</h1>
{}
  <form method="post" action="/auth/login">
    <input type="hidden" name="redirectTo" value="{}" />
{}
  </form>
  <p><a href="/auth/reset-password">Forgot your password?</a></p>
</body>
</html>"#,
        error_block,
        html_escape::encode_double_quoted_attribute(redirect_to),
        buttons,
    )
}

/// GET /auth
async fn sign_in_page(
    State(state): State<AppState>,
    Query(query): Query<SignInPageQuery>,
) -> Html<String> {
    let providers = state
        .providers
        .iter()
        .map(|provider| (provider.name(), provider.display_name()))
        .collect::<Vec<_>>();
    let redirect_to = sanitize_callback_path(query.redirect_to.as_deref());

    Html(render_sign_in_page(
        &providers,
        &redirect_to,
        query.error.as_deref(),
    ))
}

/// Login form fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginForm {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    redirect_to: Option<String>,
}

/// Decide where a login form submission goes
///
/// The provider must be named and registered. The callback URL is the
/// sanitized `redirectTo`, or `/`.
fn login_outcome(state: &AppState, form: &LoginForm) -> Result<Outcome<()>, AppError> {
    let provider_name = form
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::Validation("Provider required".to_string()))?;
    let provider = state.providers.get(provider_name)?;

    let callback = sanitize_callback_path(form.redirect_to.as_deref());
    Ok(Outcome::see_other(format!(
        "/auth/signin/{}?callbackUrl={}",
        provider.name(),
        urlencoding::encode(&callback)
    )))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Outcome<()>, AppError> {
    login_outcome(&state, &form)
}

/// POST /auth/logout
async fn logout() -> Outcome<()> {
    Outcome::see_other("/auth/signout")
}

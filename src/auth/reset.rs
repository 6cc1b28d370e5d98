//! Password reset request
//!
//! Sign-in is OAuth only, so there is no password to reset. The form
//! accepts an address and answers with one generic message whether or not
//! an account exists. No token is issued and no mail is sent.

use axum::{
    Json, Router,
    extract::State,
    response::Html,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::api::FormBody;
use crate::data::Email;
use crate::error::AppError;

/// Message returned for every well-formed address
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists with this email, you will receive password reset instructions.";

/// Create password reset router
///
/// Routes:
/// - GET /auth/reset-password - Request form
/// - POST /auth/reset-password - Submit request
pub fn reset_router() -> Router<AppState> {
    Router::new().route(
        "/auth/reset-password",
        get(reset_password_page).post(request_reset),
    )
}

/// GET /auth/reset-password
async fn reset_password_page() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Reset password - Taco Reviews</title>
</head>
<body>
  <h1>Reset password</h1>
  <form method="post" action="/auth/reset-password">
    <label for="email">Email</label>
    <input id="email" type="email" name="email" required />
    <button type="submit">Send reset instructions</button>
  </form>
</body>
</html>"#,
    )
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'static str,
}

/// POST /auth/reset-password
///
/// # Steps
/// 1. Validate the address (malformed → 400, nothing looked up)
/// 2. Look up the account
/// 3. Answer with the generic message either way
async fn request_reset(
    State(state): State<AppState>,
    FormBody(form): FormBody<ResetPasswordForm>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    let email = Email::parse(&form.email)
        .map_err(|_| AppError::Validation("Invalid email address".to_string()))?;

    let user = state.db.get_user_by_email(email.as_str()).await?;
    tracing::info!(account_found = user.is_some(), "Password reset requested");

    Ok(Json(ResetPasswordResponse {
        kind: "success",
        message: RESET_REQUESTED_MESSAGE,
    }))
}

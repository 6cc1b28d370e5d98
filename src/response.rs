//! Explicit handler outcomes
//!
//! Page loads and form actions return an [`Outcome`] instead of
//! short-circuiting with a redirect error.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Either render `T` or redirect the browser elsewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Redirect { status: StatusCode, location: String },
    Render(T),
}

impl<T> Outcome<T> {
    /// 302 Found
    pub fn found(location: impl Into<String>) -> Self {
        Self::Redirect {
            status: StatusCode::FOUND,
            location: location.into(),
        }
    }

    /// 303 See Other (used after form POSTs)
    pub fn see_other(location: impl Into<String>) -> Self {
        Self::Redirect {
            status: StatusCode::SEE_OTHER,
            location: location.into(),
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect { location, .. } => Some(location),
            Self::Render(_) => None,
        }
    }
}

impl<T: IntoResponse> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect { status, location } => redirect_response(status, &location),
            Self::Render(body) => body.into_response(),
        }
    }
}

/// Build a bare redirect response
pub fn redirect_response(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(error) => {
            tracing::error!(%error, location, "Refusing to redirect to invalid location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Reduce a user-supplied callback URL to a same-origin path.
///
/// Anything that is not an absolute path on this host becomes "/".
pub fn sanitize_callback_path(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_outcome_sets_status_and_location() {
        let response = Outcome::<()>::see_other("/auth/signout").into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/auth/signout"
        );
    }

    #[test]
    fn render_outcome_uses_body() {
        let response = Outcome::Render("hello").into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn callback_paths_stay_on_this_host() {
        assert_eq!(sanitize_callback_path(Some("/account")), "/account");
        assert_eq!(sanitize_callback_path(Some("/a?b=c")), "/a?b=c");
        assert_eq!(sanitize_callback_path(None), "/");
        assert_eq!(sanitize_callback_path(Some("")), "/");
        assert_eq!(sanitize_callback_path(Some("https://evil.example")), "/");
        assert_eq!(sanitize_callback_path(Some("//evil.example")), "/");
        assert_eq!(sanitize_callback_path(Some("/\\evil.example")), "/");
    }
}

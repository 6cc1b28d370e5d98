//! OAuth identity providers
//!
//! The authorization-code flow (consent URL, CSRF state, PKCE and the
//! token exchange) runs through a configured [`oauth2`] client per
//! provider; the profile endpoints are plain reqwest calls.

use axum::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{AuthConfig, OAuthClientConfig};
use crate::data::OAuthIdentity;
use crate::error::AppError;

/// Consent redirect plus the values the callback must check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Provider consent page
    pub url: String,
    /// CSRF state echoed back on the callback
    pub csrf_state: String,
    /// PKCE verifier sent with the token exchange
    pub pkce_verifier: String,
}

/// A third-party OAuth 2.0 identity provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name used in routes ("github", "google")
    fn name(&self) -> &'static str;

    /// Human-readable label for the sign-in page
    fn display_name(&self) -> &'static str;

    /// Start a flow: consent URL with fresh CSRF state and PKCE challenge
    fn authorize(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError>;

    /// Exchange an authorization code for an access token
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce_verifier: &str,
    ) -> Result<String, AppError>;

    /// Fetch the account behind an access token
    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity, AppError>;
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Static endpoints and scopes of one provider
struct OAuthEndpoints {
    label: &'static str,
    auth_url: &'static str,
    token_url: &'static str,
    scopes: &'static [&'static str],
}

impl OAuthEndpoints {
    fn client(
        &self,
        credentials: &OAuthClientConfig,
        redirect_uri: &str,
    ) -> Result<ConfiguredClient, AppError> {
        let auth_url = AuthUrl::new(self.auth_url.to_string())
            .map_err(|e| AppError::Config(format!("Invalid {} auth URL: {e}", self.label)))?;
        let token_url = TokenUrl::new(self.token_url.to_string())
            .map_err(|e| AppError::Config(format!("Invalid {} token URL: {e}", self.label)))?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AppError::Config(format!("Invalid redirect URL: {e}")))?;

        Ok(BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url))
    }

    fn authorize(
        &self,
        credentials: &OAuthClientConfig,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, AppError> {
        let client = self.client(credentials, redirect_uri)?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().map(|scope| Scope::new(scope.to_string())))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        })
    }

    async fn exchange_code(
        &self,
        credentials: &OAuthClientConfig,
        code: &str,
        redirect_uri: &str,
        pkce_verifier: &str,
    ) -> Result<String, AppError> {
        let client = self.client(credentials, redirect_uri)?;

        // The token endpoint must not be followed through redirects
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&http_client)
            .await
            .map_err(|e| AppError::OAuth(format!("{} token exchange failed: {e}", self.label)))?;

        Ok(token.access_token().secret().clone())
    }
}

// =============================================================================
// GitHub
// =============================================================================

const GITHUB: OAuthEndpoints = OAuthEndpoints {
    label: "GitHub",
    auth_url: "https://github.com/login/oauth/authorize",
    token_url: "https://github.com/login/oauth/access_token",
    scopes: &["read:user", "user:email"],
};
const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub OAuth app
pub struct GitHubProvider {
    client: OAuthClientConfig,
    http: reqwest::Client,
}

/// GitHub user info
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

/// Entry of GET /user/emails
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubProvider {
    pub fn new(client: OAuthClientConfig, http: reqwest::Client) -> Self {
        Self { client, http }
    }

    async fn primary_email(&self, access_token: &str) -> Result<String, AppError> {
        let emails: Vec<GitHubEmail> = self
            .http
            .get(format!("{GITHUB_API_URL}/user/emails"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone())
            .ok_or_else(|| AppError::OAuth("GitHub account has no verified email".to_string()))
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn display_name(&self) -> &'static str {
        "GitHub"
    }

    fn authorize(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError> {
        GITHUB.authorize(&self.client, redirect_uri)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce_verifier: &str,
    ) -> Result<String, AppError> {
        GITHUB
            .exchange_code(&self.client, code, redirect_uri, pkce_verifier)
            .await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity, AppError> {
        let user: GitHubUser = self
            .http
            .get(format!("{GITHUB_API_URL}/user"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The public profile email is optional; fall back to the account's
        // primary verified address.
        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => self.primary_email(access_token).await?,
        };

        Ok(OAuthIdentity {
            provider: self.name().to_string(),
            provider_account_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            image: user.avatar_url,
        })
    }
}

// =============================================================================
// Google
// =============================================================================

const GOOGLE: OAuthEndpoints = OAuthEndpoints {
    label: "Google",
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    scopes: &["openid", "email", "profile"],
};
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google OAuth client
pub struct GoogleProvider {
    client: OAuthClientConfig,
    http: reqwest::Client,
}

/// OpenID Connect userinfo claims
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(client: OAuthClientConfig, http: reqwest::Client) -> Self {
        Self { client, http }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn display_name(&self) -> &'static str {
        "Google"
    }

    fn authorize(&self, redirect_uri: &str) -> Result<AuthorizationRequest, AppError> {
        GOOGLE.authorize(&self.client, redirect_uri)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce_verifier: &str,
    ) -> Result<String, AppError> {
        GOOGLE
            .exchange_code(&self.client, code, redirect_uri, pkce_verifier)
            .await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<OAuthIdentity, AppError> {
        let info: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = match (info.email, info.email_verified) {
            (Some(email), Some(true)) => email,
            _ => {
                return Err(AppError::OAuth(
                    "Google account has no verified email".to_string(),
                ));
            }
        };

        Ok(OAuthIdentity {
            provider: self.name().to_string(),
            provider_account_id: info.sub,
            email,
            name: info.name,
            image: info.picture,
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Providers available for sign-in, keyed by name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register GitHub and Google from configuration
    pub fn from_config(auth: &AuthConfig, http: reqwest::Client) -> Self {
        Self::new()
            .with(Arc::new(GitHubProvider::new(auth.github.clone(), http.clone())))
            .with(Arc::new(GoogleProvider::new(auth.google.clone(), http)))
    }

    /// Add or replace a provider
    pub fn with(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    /// Look up a provider by name
    ///
    /// # Errors
    /// `InvalidProvider` if no provider has that name
    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, AppError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::InvalidProvider(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn OAuthProvider>> {
        self.providers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[test]
    fn github_authorize_url_carries_client_scope_state_and_pkce() {
        let provider = GitHubProvider::new(client(), reqwest::Client::new());
        let request = provider
            .authorize("http://localhost:8080/auth/callback/github")
            .unwrap();
        let url = &request.url;

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
        assert!(url.contains(&format!("state={}", request.csrf_state)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fcallback%2Fgithub"));
        assert!(!url.contains(&request.pkce_verifier));
    }

    #[test]
    fn google_authorize_url_requests_openid_scopes() {
        let provider = GoogleProvider::new(client(), reqwest::Client::new());
        let request = provider
            .authorize("https://tacos.example.com/auth/callback/google")
            .unwrap();

        assert!(request.url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(request.url.contains("scope=openid+email+profile"));
        assert!(request.url.contains("response_type=code"));
        assert!(request.url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn each_flow_gets_fresh_state_and_verifier() {
        let provider = GitHubProvider::new(client(), reqwest::Client::new());
        let redirect = "http://localhost:8080/auth/callback/github";

        let first = provider.authorize(redirect).unwrap();
        let second = provider.authorize(redirect).unwrap();

        assert!(!first.csrf_state.is_empty());
        assert_ne!(first.csrf_state, second.csrf_state);
        assert_ne!(first.pkce_verifier, second.pkce_verifier);
    }

    #[test]
    fn malformed_redirect_uri_is_a_config_error() {
        let provider = GitHubProvider::new(client(), reqwest::Client::new());

        assert!(matches!(
            provider.authorize("not a url"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn registry_rejects_unknown_provider() {
        let auth = AuthConfig {
            session_secret: "x".repeat(32),
            session_max_age: 60,
            github: client(),
            google: client(),
        };
        let registry = ProviderRegistry::from_config(&auth, reqwest::Client::new());

        assert!(registry.get("github").is_ok());
        assert!(registry.get("google").is_ok());
        assert!(matches!(
            registry.get("myspace"),
            Err(AppError::InvalidProvider(name)) if name == "myspace"
        ));
        assert_eq!(registry.iter().count(), 2);
    }
}
